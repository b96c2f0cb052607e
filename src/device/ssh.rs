//! SSH-backed device sessions.
//!
//! Opens an interactive PTY shell over `russh` and hands its channel to a
//! [`CliDriver`], which waits for the prompt, disables paging and exchanges
//! commands. Every read is bounded by the configured command timeout; connect
//! and login by the connect timeout. This is the only place network I/O to
//! devices happens.

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::ssh_key::PublicKey;
use russh::{Channel, ChannelMsg, Disconnect};

use crate::config::{Credentials, DeviceConfig};
use crate::device::driver::{CliDriver, ShellTransport};
use crate::device::{DeviceSession, DeviceTarget, SessionFactory};
use crate::error::GatewayError;

/// Builds [`SshDeviceSession`]s with the process-wide credentials.
pub struct SshSessionFactory {
    credentials: Arc<Credentials>,
    settings: DeviceConfig,
}

impl SshSessionFactory {
    pub fn new(credentials: Arc<Credentials>, settings: DeviceConfig) -> Self {
        Self {
            credentials,
            settings,
        }
    }
}

impl SessionFactory for SshSessionFactory {
    fn create(&self, target: &DeviceTarget) -> crate::Result<Box<dyn DeviceSession>> {
        Ok(Box::new(SshDeviceSession::new(
            target.clone(),
            self.credentials.clone(),
            self.settings.clone(),
        )))
    }
}

/// Server host key policy for one connection.
struct HostKeyPolicy {
    host: String,
    port: u16,
    strict: bool,
}

impl client::Handler for HostKeyPolicy {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        if !self.strict {
            return Ok(true);
        }
        match russh::keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(known) => {
                if !known {
                    tracing::warn!(host = %self.host, "host key not present in known_hosts");
                }
                Ok(known)
            }
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "host key verification failed");
                Ok(false)
            }
        }
    }
}

/// Shell channel of an open SSH connection.
struct SshShell {
    channel: Channel<client::Msg>,
}

#[async_trait]
impl ShellTransport for SshShell {
    async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.channel
            .data(data)
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))
    }

    async fn read(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.channel.wait().await? {
                ChannelMsg::Data { data } => return Some(data.to_vec()),
                ChannelMsg::ExtendedData { data, .. } => return Some(data.to_vec()),
                ChannelMsg::Eof | ChannelMsg::Close => return None,
                _ => {}
            }
        }
    }

    async fn finish(&mut self) -> std::io::Result<()> {
        self.channel
            .eof()
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))
    }
}

struct Connection {
    handle: Handle<HostKeyPolicy>,
    driver: CliDriver<SshShell>,
}

/// One interactive SSH shell on a network device.
pub struct SshDeviceSession {
    target: DeviceTarget,
    credentials: Arc<Credentials>,
    settings: DeviceConfig,
    conn: Option<Connection>,
}

impl SshDeviceSession {
    pub fn new(target: DeviceTarget, credentials: Arc<Credentials>, settings: DeviceConfig) -> Self {
        Self {
            target,
            credentials,
            settings,
            conn: None,
        }
    }

    fn connection_error(&self, message: impl Into<String>) -> GatewayError {
        GatewayError::Connection(self.target.host().to_string(), message.into())
    }

    fn driver(&mut self) -> crate::Result<&mut CliDriver<SshShell>> {
        let host = self.target.host();
        self.conn
            .as_mut()
            .map(|conn| &mut conn.driver)
            .ok_or_else(|| GatewayError::Connection(host.to_string(), "session is not open".into()))
    }

    /// TCP connect, SSH handshake, password auth, PTY + shell.
    async fn establish(&self) -> crate::Result<(Handle<HostKeyPolicy>, Channel<client::Msg>)> {
        let host = self.target.host().to_string();
        let port = self.settings.port;
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.settings.command_timeout() * 2),
            ..Default::default()
        });
        let policy = HostKeyPolicy {
            host: host.clone(),
            port,
            strict: self.credentials.strict_host_key_checking,
        };

        let mut handle = client::connect(config, (host.as_str(), port), policy)
            .await
            .map_err(|e| self.connection_error(e.to_string()))?;

        let auth = handle
            .authenticate_password(
                self.credentials.username.clone(),
                self.credentials.password().to_string(),
            )
            .await
            .map_err(|e| self.connection_error(e.to_string()))?;
        if !auth.success() {
            return Err(GatewayError::Authentication(
                host,
                self.credentials.username.clone(),
            ));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| self.connection_error(format!("failed to open channel: {}", e)))?;
        channel
            .request_pty(false, "xterm", 511, 24, 0, 0, &[])
            .await
            .map_err(|e| self.connection_error(format!("pty request rejected: {}", e)))?;
        channel
            .request_shell(false)
            .await
            .map_err(|e| self.connection_error(format!("shell request rejected: {}", e)))?;

        Ok((handle, channel))
    }
}

#[async_trait]
impl DeviceSession for SshDeviceSession {
    fn target(&self) -> &DeviceTarget {
        &self.target
    }

    async fn open(&mut self) -> crate::Result<()> {
        let timeout = self.settings.connect_timeout();
        let (handle, channel) = tokio::time::timeout(timeout, self.establish())
            .await
            .map_err(|_| {
                GatewayError::Timeout(
                    self.target.host().to_string(),
                    "connect".to_string(),
                    timeout.as_secs(),
                )
            })??;
        let driver = CliDriver::new(
            self.target.host(),
            self.target.platform(),
            self.settings.command_timeout(),
            SshShell { channel },
        );
        self.conn = Some(Connection { handle, driver });
        self.driver()?.prepare().await?;

        tracing::debug!(
            host = %self.target.host(),
            platform = %self.target.platform(),
            "device session ready"
        );
        Ok(())
    }

    async fn send_command(&mut self, command: &str) -> crate::Result<String> {
        self.driver()?.send_command(command).await
    }

    async fn send_config(&mut self, command: &str) -> crate::Result<String> {
        let outputs = self.send_configs(&[command.to_string()]).await?;
        Ok(outputs.join("\n"))
    }

    async fn send_configs(&mut self, commands: &[String]) -> crate::Result<Vec<String>> {
        self.driver()?.send_configs(commands).await
    }

    async fn close(&mut self) -> crate::Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        conn.driver.finish().await;
        conn.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| self.connection_error(format!("disconnect failed: {}", e)))?;
        tracing::debug!(host = %self.target.host(), "device session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> SshSessionFactory {
        SshSessionFactory::new(
            Arc::new(Credentials::new("admin", "admin", false)),
            DeviceConfig::default(),
        )
    }

    #[test]
    fn test_factory_create_performs_no_io() {
        let target = DeviceTarget::new("192.0.2.1", "cisco_iosxe").unwrap();
        let session = factory().create(&target).unwrap();
        assert_eq!(session.target(), &target);
    }

    #[tokio::test]
    async fn test_close_before_open_is_noop() {
        let target = DeviceTarget::new("192.0.2.1", "arista_eos").unwrap();
        let mut session = factory().create(&target).unwrap();
        assert!(session.close().await.is_ok());
        assert!(session.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_send_without_open_is_connection_error() {
        let target = DeviceTarget::new("192.0.2.1", "cisco_nxos").unwrap();
        let mut session = factory().create(&target).unwrap();
        let result = session.send_command("show version").await;
        assert!(matches!(result, Err(GatewayError::Connection(host, _)) if host == "192.0.2.1"));
    }
}
