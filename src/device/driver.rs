//! CLI driver — command/response exchange over an interactive shell.
//!
//! Writes one line at a time and reads until the platform prompt returns,
//! then strips the echo and the prompt. Configuration changes are wrapped in
//! the platform's enter and exit/commit sequence, or its abort sequence once
//! a line or the commit is rejected. The byte stream underneath is a
//! [`ShellTransport`]; in production that is a russh channel.

use std::time::Duration;

use async_trait::async_trait;

use crate::device::Platform;
use crate::device::channel::{PromptBuffer, clean_output};
use crate::error::GatewayError;

/// Byte stream of one interactive shell.
#[async_trait]
pub trait ShellTransport: Send {
    async fn write(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Next chunk of output, or `None` once the device closed the shell.
    async fn read(&mut self) -> Option<Vec<u8>>;

    /// Signal end of input to the device.
    async fn finish(&mut self) -> std::io::Result<()>;
}

/// Speaks one platform's CLI over a [`ShellTransport`].
pub struct CliDriver<T> {
    host: String,
    platform: Platform,
    command_timeout: Duration,
    transport: T,
    buffer: PromptBuffer,
}

impl<T: ShellTransport> CliDriver<T> {
    pub fn new(
        host: impl Into<String>,
        platform: Platform,
        command_timeout: Duration,
        transport: T,
    ) -> Self {
        Self {
            host: host.into(),
            platform,
            command_timeout,
            transport,
            buffer: PromptBuffer::new(),
        }
    }

    fn connection_error(&self, message: impl Into<String>) -> GatewayError {
        GatewayError::Connection(self.host.clone(), message.into())
    }

    fn rejected(&self, command: &str, detail: &str, partial_outputs: Vec<String>) -> GatewayError {
        GatewayError::Execution {
            host: self.host.clone(),
            message: format!("'{}' rejected: {}", command, detail),
            partial_outputs,
        }
    }

    /// Wait for the first prompt, then run the platform's paging-off commands.
    pub async fn prepare(&mut self) -> crate::Result<()> {
        self.read_until_prompt("connect").await?;
        for command in self.platform.profile().on_open {
            self.exchange(command, "on_open").await?;
        }
        Ok(())
    }

    /// Read output until the platform prompt is the last line.
    async fn read_until_prompt(&mut self, operation: &str) -> crate::Result<String> {
        let prompt = self.platform.prompt();
        let timeout = self.command_timeout;
        let buffer = &mut self.buffer;
        let transport = &mut self.transport;

        let read = async {
            loop {
                if buffer.ends_with_prompt(prompt) {
                    return Some(buffer.take());
                }
                buffer.push(&transport.read().await?);
            }
        };

        match tokio::time::timeout(timeout, read).await {
            Ok(Some(raw)) => Ok(raw),
            Ok(None) => Err(self.connection_error("channel closed by device")),
            Err(_) => Err(GatewayError::Timeout(
                self.host.clone(),
                operation.to_string(),
                timeout.as_secs(),
            )),
        }
    }

    /// Send one line and return its cleaned output.
    async fn exchange(&mut self, command: &str, operation: &str) -> crate::Result<String> {
        let line = format!("{}\n", command);
        if let Err(e) = self.transport.write(line.as_bytes()).await {
            return Err(self.connection_error(format!("write failed: {}", e)));
        }
        let raw = self.read_until_prompt(operation).await?;
        Ok(clean_output(&raw, command, self.platform.prompt()))
    }

    pub async fn send_command(&mut self, command: &str) -> crate::Result<String> {
        let output = self.exchange(command, "send_command").await?;
        match self.platform.failure_in(&output) {
            Some(marker) => Err(self.rejected(command, marker, vec![output])),
            None => Ok(output),
        }
    }

    /// Apply `commands` inside one configuration-mode visit.
    ///
    /// A rejected line or commit sends the abort sequence and fails with
    /// `Execution`. A timeout or lost channel keeps its own variant, wrapped
    /// in `Incomplete` with the outputs captured so far.
    pub async fn send_configs(&mut self, commands: &[String]) -> crate::Result<Vec<String>> {
        let profile = self.platform.profile();
        self.exchange(profile.config_enter, "config_enter").await?;

        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            let output = match self.exchange(command, "send_config").await {
                Ok(output) => output,
                Err(e) => {
                    if !matches!(e, GatewayError::Connection(..)) {
                        self.abort_config().await;
                    }
                    return Err(GatewayError::Incomplete {
                        source: Box::new(e),
                        partial_outputs: outputs,
                    });
                }
            };
            let marker = self.platform.failure_in(&output);
            outputs.push(output);
            if let Some(marker) = marker {
                self.abort_config().await;
                return Err(self.rejected(command, marker, outputs));
            }
        }

        for step in profile.config_exit {
            let output = match self.exchange(step, "config_exit").await {
                Ok(output) => output,
                Err(e) => {
                    return Err(GatewayError::Incomplete {
                        source: Box::new(e),
                        partial_outputs: outputs,
                    });
                }
            };
            if self.platform.failure_in(&output).is_some() {
                self.abort_config().await;
                return Err(self.rejected(step, output.trim(), outputs));
            }
        }
        Ok(outputs)
    }

    /// Leave configuration mode without committing. Errors are only logged.
    async fn abort_config(&mut self) {
        for step in self.platform.profile().config_abort {
            if let Err(e) = self.exchange(step, "config_abort").await {
                tracing::warn!(host = %self.host, error = %e, "failed to abort configuration mode");
                return;
            }
        }
    }

    /// Send EOF on the shell.
    pub async fn finish(&mut self) {
        if let Err(e) = self.transport.finish().await {
            tracing::debug!(host = %self.host, error = %e, "failed to send EOF to device");
        }
    }
}
