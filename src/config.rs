//! Netgate configuration — TOML deserialization, validation, and credential loading.

use std::path::Path;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::GatewayError;

/// Environment variable holding the device login username.
pub const USERNAME_ENV: &str = "AUTH_USERNAME";

/// Environment variable holding the device login password.
pub const PASSWORD_ENV: &str = "AUTH_PASSWORD";

/// Top-level Netgate configuration, parsed from TOML.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub sse: SseConfig,
}

/// Bind address for `netgate serve`. Fixed for the life of the process.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// SSH connection parameters shared by every device session.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// SSH port on the managed devices.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// TCP connect + SSH handshake + authentication budget.
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Budget for a single command to return to a prompt.
    #[serde(default = "default_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default)]
    pub strict_host_key_checking: bool,
}

/// Event-stream tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct SseConfig {
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ssh_port() -> u16 {
    22
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_keep_alive_secs() -> u64 {
    15
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: default_ssh_port(),
            connect_timeout_secs: default_timeout_secs(),
            command_timeout_secs: default_timeout_secs(),
            strict_host_key_checking: false,
        }
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl DeviceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl SseConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl GatewayConfig {
    /// Parse a config from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: GatewayConfig =
            toml::from_str(content).map_err(|e| GatewayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a config file.
    pub async fn load(path: &Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate the config, failing fast before anything binds or connects.
    pub fn validate(&self) -> crate::Result<()> {
        if self.listener.host.trim().is_empty() {
            return Err(GatewayError::Config("listener.host must not be empty".into()));
        }
        if self.device.port == 0 {
            return Err(GatewayError::Config("device.port must be non-zero".into()));
        }
        if self.device.connect_timeout_secs == 0 || self.device.command_timeout_secs == 0 {
            return Err(GatewayError::Config(
                "device timeouts must be at least 1 second".into(),
            ));
        }
        if self.sse.keep_alive_secs == 0 {
            return Err(GatewayError::Config(
                "sse.keep_alive_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Device login credentials, loaded once at startup and shared read-only.
///
/// The password is held as a [`SecretString`] so `Debug` output and tracing
/// fields never contain it.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    password: SecretString,
    pub strict_host_key_checking: bool,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        strict_host_key_checking: bool,
    ) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            strict_host_key_checking,
        }
    }

    /// Load credentials from `AUTH_USERNAME` / `AUTH_PASSWORD`.
    ///
    /// Both variables must be present; the password may be empty.
    pub fn from_env(strict_host_key_checking: bool) -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), strict_host_key_checking)
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        strict_host_key_checking: bool,
    ) -> crate::Result<Self> {
        let username = lookup(USERNAME_ENV)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| GatewayError::Config(format!("{USERNAME_ENV} is not set")))?;
        let password = lookup(PASSWORD_ENV)
            .ok_or_else(|| GatewayError::Config(format!("{PASSWORD_ENV} is not set")))?;
        Ok(Self::new(username, password, strict_host_key_checking))
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GatewayConfig::from_toml_str("").unwrap();
        assert_eq!(config.listener.host, "0.0.0.0");
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.device.port, 22);
        assert_eq!(config.device.command_timeout(), Duration::from_secs(30));
        assert!(!config.device.strict_host_key_checking);
        assert_eq!(config.sse.keep_alive_secs, 15);
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
[listener]
port = 9000

[device]
command_timeout_secs = 60
strict_host_key_checking = true
"#;
        let config = GatewayConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.listener.host, "0.0.0.0");
        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.device.command_timeout_secs, 60);
        assert_eq!(config.device.connect_timeout_secs, 30);
        assert!(config.device.strict_host_key_checking);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = GatewayConfig::from_toml_str("[device]\nconnect_timeout_secs = 0\n");
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = GatewayConfig::from_toml_str("[listener\nport = 1");
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netgate.toml");
        std::fs::write(&path, "[sse]\nkeep_alive_secs = 5\n").unwrap();
        let config = GatewayConfig::load(&path).await.unwrap();
        assert_eq!(config.sse.keep_alive_secs, 5);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = GatewayConfig::load(Path::new("/nonexistent/netgate.toml")).await;
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_credentials_from_lookup() {
        let env: HashMap<&str, &str> =
            HashMap::from([(USERNAME_ENV, "admin"), (PASSWORD_ENV, "s3cret")]);
        let creds =
            Credentials::from_lookup(|k| env.get(k).map(|v| v.to_string()), false).unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password(), "s3cret");
    }

    #[test]
    fn test_credentials_missing_username() {
        let result = Credentials::from_lookup(|_| None, false);
        assert!(
            matches!(result, Err(GatewayError::Config(msg)) if msg.contains(USERNAME_ENV))
        );
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("admin", "hunter2", false);
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }
}
