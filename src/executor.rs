//! Tool executor — drives one device session per invocation.
//!
//! Every operation follows the same scoped pattern: create a session through
//! the factory, open it, run exactly one action, then close it on every exit
//! path. Nothing is cached between calls and there are no retries here; the
//! first connect or execute failure is the invocation's result.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::device::{DeviceSession, DeviceTarget, SessionFactory, SessionState};
use crate::error::GatewayError;

/// The single device action an invocation performs.
#[async_trait]
pub trait DeviceAction: Send + Sync {
    type Output: Send;

    /// Tool name reported in logs.
    fn name(&self) -> &'static str;

    async fn run(&self, session: &mut dyn DeviceSession) -> crate::Result<Self::Output>;
}

/// Operational command; output is the device's reply.
pub struct SendCommand<'a>(pub &'a str);

/// One configuration line.
pub struct SendConfig<'a>(pub &'a str);

/// Configuration lines applied in order; one output per line.
pub struct SendConfigs<'a>(pub &'a [String]);

#[async_trait]
impl DeviceAction for SendCommand<'_> {
    type Output = String;

    fn name(&self) -> &'static str {
        "send_command"
    }

    async fn run(&self, session: &mut dyn DeviceSession) -> crate::Result<String> {
        session.send_command(self.0).await
    }
}

#[async_trait]
impl DeviceAction for SendConfig<'_> {
    type Output = String;

    fn name(&self) -> &'static str {
        "send_config"
    }

    async fn run(&self, session: &mut dyn DeviceSession) -> crate::Result<String> {
        session.send_config(self.0).await
    }
}

#[async_trait]
impl DeviceAction for SendConfigs<'_> {
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        "send_configs"
    }

    async fn run(&self, session: &mut dyn DeviceSession) -> crate::Result<Vec<String>> {
        session.send_configs(self.0).await
    }
}

/// Owning guard over one device session and its lifecycle state.
///
/// `release` must be awaited on every path; dropping an unreleased guard is a
/// leak and is logged.
struct ScopedSession {
    session: Box<dyn DeviceSession>,
    state: SessionState,
}

impl ScopedSession {
    fn new(session: Box<dyn DeviceSession>) -> Self {
        Self {
            session,
            state: SessionState::Created,
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    async fn connect(&mut self) -> crate::Result<()> {
        self.advance(SessionState::Connecting);
        match self.session.open().await {
            Ok(()) => {
                self.advance(SessionState::Ready);
                Ok(())
            }
            Err(e) => {
                self.advance(SessionState::Failed);
                Err(e)
            }
        }
    }

    async fn perform<A: DeviceAction>(&mut self, action: &A) -> crate::Result<A::Output> {
        self.advance(SessionState::Executing);
        let result = action.run(self.session.as_mut()).await;
        self.advance(if result.is_ok() {
            SessionState::Ready
        } else {
            SessionState::Failed
        });
        result
    }

    /// Close the session. Close failures are logged, never returned, so they
    /// cannot mask the invocation's own result.
    async fn release(mut self) {
        if let Err(e) = self.session.close().await {
            tracing::warn!(
                host = %self.session.target().host(),
                error = %e,
                "device session close failed"
            );
        }
        self.state = SessionState::Closed;
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            tracing::error!(
                host = %self.session.target().host(),
                state = ?self.state,
                "device session dropped without release"
            );
        }
    }
}

/// Runs device actions, one fresh session per call.
#[derive(Clone)]
pub struct ToolExecutor {
    factory: Arc<dyn SessionFactory>,
}

impl ToolExecutor {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }

    pub async fn run_command(&self, target: &DeviceTarget, command: &str) -> crate::Result<String> {
        self.execute(target, SendCommand(command)).await
    }

    pub async fn run_config(&self, target: &DeviceTarget, command: &str) -> crate::Result<String> {
        self.execute(target, SendConfig(command)).await
    }

    /// Apply `commands` in order inside one connection.
    ///
    /// The caller owns any ordering dependency between lines, including a
    /// leading mode-entry line such as `router bgp 65000`.
    pub async fn run_config_batch(
        &self,
        target: &DeviceTarget,
        commands: &[String],
    ) -> crate::Result<Vec<String>> {
        self.execute(target, SendConfigs(commands)).await
    }

    /// Acquire, connect, perform, release.
    pub async fn execute<A: DeviceAction>(
        &self,
        target: &DeviceTarget,
        action: A,
    ) -> crate::Result<A::Output> {
        let start = Instant::now();
        let mut scoped = ScopedSession::new(self.factory.create(target)?);

        let result = match scoped.connect().await {
            Ok(()) => scoped.perform(&action).await,
            Err(e) => Err(e),
        };
        scoped.release().await;

        let elapsed = start.elapsed().as_millis();
        match &result {
            Ok(_) => tracing::info!(
                host = %target.host(),
                platform = %target.platform(),
                action = action.name(),
                duration_ms = %elapsed,
                "device action completed"
            ),
            Err(e) => tracing::warn!(
                host = %target.host(),
                platform = %target.platform(),
                action = action.name(),
                duration_ms = %elapsed,
                kind = e.kind().as_str(),
                error = %e,
                "device action failed"
            ),
        }
        result
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor").finish_non_exhaustive()
    }
}

/// Reject a batch with nothing in it before any connection is made.
pub(crate) fn ensure_non_empty(tool: &str, commands: &[String]) -> crate::Result<()> {
    if commands.is_empty() {
        return Err(GatewayError::InvalidParams(
            tool.to_string(),
            "'commands' must contain at least one command".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockDevice, MockReply};
    use std::time::Duration;

    fn target() -> DeviceTarget {
        DeviceTarget::new("r1.lab", "cisco_iosxe").unwrap()
    }

    #[tokio::test]
    async fn test_run_command_returns_output_and_releases() {
        let device = MockDevice::new();
        device.reply("show version", MockReply::output("Cisco IOS XE Software"));
        let executor = ToolExecutor::new(device.factory());

        let output = executor.run_command(&target(), "show version").await.unwrap();
        assert_eq!(output, "Cisco IOS XE Software");
        assert_eq!(device.created(), 1);
        assert_eq!(device.connects(), 1);
        assert_eq!(device.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_still_releases() {
        let device = MockDevice::new();
        device.fail_connect(GatewayError::Connection("r1.lab".into(), "unreachable".into()));
        let executor = ToolExecutor::new(device.factory());

        let result = executor.run_command(&target(), "show version").await;
        assert!(matches!(result, Err(GatewayError::Connection(..))));
        assert!(device.received().is_empty());
        assert_eq!(device.closed(), 1);
        assert_eq!(device.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_execution_failure_still_releases() {
        let device = MockDevice::new();
        device.reply("shw version", MockReply::rejected("% Invalid input detected"));
        let executor = ToolExecutor::new(device.factory());

        let result = executor.run_command(&target(), "shw version").await;
        assert!(matches!(result, Err(GatewayError::Execution { .. })));
        assert_eq!(device.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_in_one_session() {
        let device = MockDevice::new();
        let executor = ToolExecutor::new(device.factory());
        let commands = vec![
            "router bgp 65000".to_string(),
            "bgp router-id 192.168.1.1".to_string(),
        ];

        let outputs = executor.run_config_batch(&target(), &commands).await.unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(device.received(), commands);
        assert_eq!(device.created(), 1);
        assert_eq!(device.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_batch_failure_reports_partial_outputs() {
        let device = MockDevice::new();
        device.reply("interface Gi0/0", MockReply::output(""));
        device.reply("ip adress 10.0.0.1 255.255.255.0", MockReply::rejected("% Invalid input detected"));
        let executor = ToolExecutor::new(device.factory());
        let commands = vec![
            "interface Gi0/0".to_string(),
            "ip adress 10.0.0.1 255.255.255.0".to_string(),
            "no shutdown".to_string(),
        ];

        let err = executor
            .run_config_batch(&target(), &commands)
            .await
            .unwrap_err();
        match err {
            GatewayError::Execution {
                partial_outputs, ..
            } => assert_eq!(partial_outputs, vec!["", "% Invalid input detected"]),
            other => panic!("expected execution error, got {other:?}"),
        }
        assert_eq!(device.received().len(), 2);
        assert_eq!(device.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_invocations_are_independent() {
        let device = MockDevice::new();
        device.reply("show clock", MockReply::delayed("12:00", Duration::from_millis(30)));
        let executor = ToolExecutor::new(device.factory());

        let target = target();
        let (a, b) = tokio::join!(
            executor.run_command(&target, "show clock"),
            executor.run_command(&target, "show clock"),
        );
        assert_eq!(a.unwrap(), "12:00");
        assert_eq!(b.unwrap(), "12:00");
        assert_eq!(device.created(), 2);
        assert_eq!(device.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_execute_single_config_line() {
        let device = MockDevice::new();
        device.reply("hostname R1", MockReply::output(""));
        let executor = ToolExecutor::new(device.factory());

        let output = executor
            .execute(&target(), SendConfig("hostname R1"))
            .await
            .unwrap();
        assert_eq!(output, "");
        assert_eq!(device.received(), vec!["hostname R1".to_string()]);
        assert_eq!(device.open_sessions(), 0);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let result = ensure_non_empty("send_configs", &[]);
        assert!(matches!(result, Err(GatewayError::InvalidParams(tool, _)) if tool == "send_configs"));
    }
}
