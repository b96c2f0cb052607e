//! Device sessions — the per-invocation connection to a network device.
//!
//! A [`DeviceTarget`] names where to connect and which CLI dialect to speak.
//! A [`SessionFactory`] turns a target into a not-yet-connected
//! [`DeviceSession`]; the executor owns that session for exactly one tool call.

pub mod channel;
pub mod driver;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod platform;
pub mod ssh;

use async_trait::async_trait;

use crate::error::GatewayError;
pub use platform::Platform;

/// Where and what kind of device to reach. Validated on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    host: String,
    platform: Platform,
}

impl DeviceTarget {
    /// Build a target from raw tool arguments.
    ///
    /// Fails with `InvalidTarget` on an empty host or an unsupported platform
    /// name; never touches the network.
    pub fn new(host: &str, platform: &str) -> crate::Result<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Err(GatewayError::InvalidTarget(
                "hostname must not be empty".to_string(),
            ));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(GatewayError::InvalidTarget(format!(
                "hostname '{}' contains whitespace",
                host
            )));
        }
        let platform = platform.parse::<Platform>()?;
        Ok(Self {
            host: host.to_string(),
            platform,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }
}

/// Lifecycle of a single device session.
///
/// `Created → Connecting → Ready ⇄ Executing → Closed`, or
/// `Created → Connecting → Failed → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Connecting,
    Ready,
    Executing,
    Failed,
    Closed,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Connecting)
                | (Connecting, Ready)
                | (Connecting, Failed)
                | (Ready, Executing)
                | (Executing, Ready)
                | (Executing, Failed)
                | (Created | Connecting | Ready | Executing | Failed, Closed)
        )
    }
}

/// A live, single-use connection to one device.
///
/// Implementations are driven strictly in order: `open`, then any number of
/// sends, then `close`. `close` must be safe to call after a failed `open`.
#[async_trait]
pub trait DeviceSession: Send {
    fn target(&self) -> &DeviceTarget;

    /// Connect, authenticate, and bring the CLI to a usable prompt.
    async fn open(&mut self) -> crate::Result<()>;

    /// Run one exec-mode command and return its output.
    async fn send_command(&mut self, command: &str) -> crate::Result<String>;

    /// Apply one configuration statement and return its output.
    async fn send_config(&mut self, command: &str) -> crate::Result<String>;

    /// Apply configuration statements in order inside one config-mode entry.
    ///
    /// On failure the error is `GatewayError::Execution` carrying the outputs
    /// of every statement sent so far, the failing one included.
    async fn send_configs(&mut self, commands: &[String]) -> crate::Result<Vec<String>>;

    /// Tear the connection down. Idempotent.
    async fn close(&mut self) -> crate::Result<()>;
}

/// Constructs unconnected sessions with process-wide credentials injected.
pub trait SessionFactory: Send + Sync {
    fn create(&self, target: &DeviceTarget) -> crate::Result<Box<dyn DeviceSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_valid() {
        let target = DeviceTarget::new(" 192.168.1.1 ", "cisco_iosxe").unwrap();
        assert_eq!(target.host(), "192.168.1.1");
        assert_eq!(target.platform(), Platform::CiscoIosxe);
    }

    #[test]
    fn test_target_empty_host() {
        let result = DeviceTarget::new("   ", "cisco_iosxe");
        assert!(matches!(result, Err(GatewayError::InvalidTarget(_))));
    }

    #[test]
    fn test_target_host_with_whitespace() {
        let result = DeviceTarget::new("r1 r2", "cisco_iosxe");
        assert!(matches!(result, Err(GatewayError::InvalidTarget(_))));
    }

    #[test]
    fn test_target_unknown_platform() {
        let result = DeviceTarget::new("r1", "windows_xp");
        assert!(
            matches!(result, Err(GatewayError::InvalidTarget(msg)) if msg.contains("windows_xp"))
        );
    }

    #[test]
    fn test_session_lifecycle_transitions() {
        use SessionState::*;
        assert!(Created.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Ready));
        assert!(Connecting.can_transition_to(Failed));
        assert!(Ready.can_transition_to(Executing));
        assert!(Executing.can_transition_to(Ready));
        assert!(Failed.can_transition_to(Closed));
        assert!(Ready.can_transition_to(Closed));

        assert!(!Created.can_transition_to(Ready));
        assert!(!Closed.can_transition_to(Connecting));
        assert!(!Closed.can_transition_to(Closed));
        assert!(!Failed.can_transition_to(Ready));
    }
}
