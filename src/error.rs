//! Error types for Netgate gateway operations.

use rmcp::model::{CallToolResult, Content};
use serde_json::json;
use thiserror::Error;

/// Main error type for Netgate operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No tool with this name is registered
    #[error("tool not found: {0}")]
    UnknownTool(String),

    /// Arguments for a named tool are missing or malformed
    #[error("invalid params for tool '{0}': {1}")]
    InvalidParams(String, String),

    /// Device target could not be built (empty host, unknown platform)
    #[error("invalid device target: {0}")]
    InvalidTarget(String),

    /// Host unreachable or SSH negotiation failed
    #[error("connection to '{0}' failed: {1}")]
    Connection(String, String),

    /// Device rejected the configured credentials
    #[error("authentication to '{0}' failed for user '{1}'")]
    Authentication(String, String),

    /// Device rejected a command; carries every output captured up to and
    /// including the failing command
    #[error("execution on '{host}' failed: {message}")]
    Execution {
        host: String,
        message: String,
        partial_outputs: Vec<String>,
    },

    /// Device did not answer an operation in time
    #[error("{1} on '{0}' timed out after {2}s")]
    Timeout(String, String, u64),

    /// A batch stopped on a connection or timeout error; keeps the outputs
    /// captured before it
    #[error("{source}")]
    Incomplete {
        source: Box<GatewayError>,
        partial_outputs: Vec<String>,
    },

    /// No streaming session with this id
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Streaming session closed before the message could be queued
    #[error("session '{0}' is closed")]
    SessionClosed(String),

    /// Malformed JSON-RPC message
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid gateway configuration or missing environment
    #[error("invalid config: {0}")]
    Config(String),
}

/// Result type alias for Netgate operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Coarse error classes reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Detected before any network I/O
    Validation,
    /// Raised while reaching or authenticating to the device
    Connection,
    /// Raised while running commands on a ready session
    Execution,
    /// Streaming session or message framing problems
    Transport,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Connection => "connection",
            ErrorKind::Execution => "execution",
            ErrorKind::Transport => "transport",
        }
    }
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::UnknownTool(_)
            | GatewayError::InvalidParams(..)
            | GatewayError::InvalidTarget(_)
            | GatewayError::Config(_) => ErrorKind::Validation,
            GatewayError::Connection(..) | GatewayError::Authentication(..) => {
                ErrorKind::Connection
            }
            GatewayError::Execution { .. } | GatewayError::Timeout(..) => ErrorKind::Execution,
            GatewayError::Incomplete { source, .. } => source.kind(),
            GatewayError::SessionNotFound(_)
            | GatewayError::SessionClosed(_)
            | GatewayError::Protocol(_) => ErrorKind::Transport,
        }
    }

    /// Outputs a failed batch captured before it stopped.
    pub fn partial_outputs(&self) -> Option<&[String]> {
        match self {
            GatewayError::Execution {
                partial_outputs, ..
            }
            | GatewayError::Incomplete {
                partial_outputs, ..
            } => Some(partial_outputs),
            _ => None,
        }
    }

    /// Render as a tool result with `isError: true`.
    ///
    /// The text content is the error message; `structured_content` carries
    /// `kind` and, for batch failures, `partial_outputs`.
    pub fn into_call_result(self) -> CallToolResult {
        let mut structured = json!({ "kind": self.kind().as_str() });
        if let Some(outputs) = self.partial_outputs() {
            structured["partial_outputs"] = json!(outputs);
        }
        CallToolResult {
            content: vec![Content::text(self.to_string())],
            is_error: Some(true),
            structured_content: Some(structured),
            meta: None,
        }
    }
}
