//! Scripted device double for tests.
//!
//! A [`MockDevice`] records every session created against it, every connect
//! attempt, every command received, and every close, and answers commands from
//! a script with optional artificial delays or failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::device::{DeviceSession, DeviceTarget, SessionFactory};
use crate::error::GatewayError;

/// Scripted reply for one command.
#[derive(Debug, Clone, Default)]
pub struct MockReply {
    pub output: String,
    pub delay: Duration,
    /// Reject the command with an execution error (output is still recorded).
    pub reject: bool,
}

impl MockReply {
    pub fn output(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn delayed(output: impl Into<String>, delay: Duration) -> Self {
        Self {
            output: output.into(),
            delay,
            reject: false,
        }
    }

    pub fn rejected(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            delay: Duration::ZERO,
            reject: true,
        }
    }
}

/// Shared recorder and script behind every [`MockSession`].
#[derive(Default)]
pub struct MockDevice {
    created: AtomicUsize,
    connects: AtomicUsize,
    closed: AtomicUsize,
    received: Mutex<Vec<String>>,
    script: Mutex<HashMap<String, MockReply>>,
    connect_failure: Mutex<Option<GatewayError>>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the reply for `command`. Unscripted commands echo an empty output.
    pub fn reply(&self, command: &str, reply: MockReply) {
        self.script
            .lock()
            .expect("mock script lock")
            .insert(command.to_string(), reply);
    }

    /// Make the next `open` fail with `error`.
    pub fn fail_connect(&self, error: GatewayError) {
        *self.connect_failure.lock().expect("mock connect lock") = Some(error);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sessions created but not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.created() - self.closed()
    }

    /// Every command received, across all sessions, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().expect("mock received lock").clone()
    }

    pub fn factory(self: &Arc<Self>) -> Arc<MockSessionFactory> {
        Arc::new(MockSessionFactory {
            device: self.clone(),
        })
    }

    async fn answer(&self, host: &str, command: &str) -> Result<String, GatewayError> {
        self.received
            .lock()
            .expect("mock received lock")
            .push(command.to_string());
        let reply = self
            .script
            .lock()
            .expect("mock script lock")
            .get(command)
            .cloned()
            .unwrap_or_default();
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        if reply.reject {
            return Err(GatewayError::Execution {
                host: host.to_string(),
                message: format!("'{}' rejected", command),
                partial_outputs: vec![reply.output],
            });
        }
        Ok(reply.output)
    }
}

pub struct MockSessionFactory {
    device: Arc<MockDevice>,
}

impl SessionFactory for MockSessionFactory {
    fn create(&self, target: &DeviceTarget) -> crate::Result<Box<dyn DeviceSession>> {
        self.device.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            device: self.device.clone(),
            target: target.clone(),
            open: false,
            closed: false,
        }))
    }
}

pub struct MockSession {
    device: Arc<MockDevice>,
    target: DeviceTarget,
    open: bool,
    closed: bool,
}

impl MockSession {
    fn ensure_open(&self) -> crate::Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(GatewayError::Connection(
                self.target.host().to_string(),
                "session is not open".into(),
            ))
        }
    }
}

#[async_trait]
impl DeviceSession for MockSession {
    fn target(&self) -> &DeviceTarget {
        &self.target
    }

    async fn open(&mut self) -> crate::Result<()> {
        self.device.connects.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .device
            .connect_failure
            .lock()
            .expect("mock connect lock")
            .take();
        match failure {
            Some(error) => Err(error),
            None => {
                self.open = true;
                Ok(())
            }
        }
    }

    async fn send_command(&mut self, command: &str) -> crate::Result<String> {
        self.ensure_open()?;
        self.device.answer(self.target.host(), command).await
    }

    async fn send_config(&mut self, command: &str) -> crate::Result<String> {
        self.ensure_open()?;
        self.device.answer(self.target.host(), command).await
    }

    async fn send_configs(&mut self, commands: &[String]) -> crate::Result<Vec<String>> {
        self.ensure_open()?;
        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            match self.device.answer(self.target.host(), command).await {
                Ok(output) => outputs.push(output),
                Err(GatewayError::Execution {
                    host,
                    message,
                    partial_outputs,
                }) => {
                    outputs.extend(partial_outputs);
                    return Err(GatewayError::Execution {
                        host,
                        message,
                        partial_outputs: outputs,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outputs)
    }

    async fn close(&mut self) -> crate::Result<()> {
        if !self.closed {
            self.closed = true;
            self.open = false;
            self.device.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
