//! JSON-RPC 2.0 envelope for MCP messages carried over SSE and STDIO.
//!
//! Payload types (tool lists, call results, error objects) come from
//! `rmcp::model`; this module only frames them.

use rmcp::ErrorData as McpError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol versions this gateway can speak, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// A JSON-RPC request ID. Never `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// Raw shape shared by every JSON-RPC message; classified by [`ClientMessage::parse`].
#[derive(Debug, Deserialize)]
struct Envelope {
    jsonrpc: String,
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// A message posted by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    /// Reply to a server-initiated request; the gateway never sends any, so
    /// these are accepted and ignored.
    Response { id: RequestId },
}

impl ClientMessage {
    /// Classify one JSON value as a request, notification, or response.
    pub fn parse(value: Value) -> crate::Result<Self> {
        if value.is_array() {
            return Err(GatewayError::Protocol(
                "batched JSON-RPC messages are not supported".into(),
            ));
        }
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| GatewayError::Protocol(format!("malformed JSON-RPC message: {}", e)))?;
        if envelope.jsonrpc != JSONRPC_VERSION {
            return Err(GatewayError::Protocol(
                "jsonrpc field must be \"2.0\"".into(),
            ));
        }

        match (envelope.id, envelope.method) {
            (Some(id), Some(method)) if !method.is_empty() => Ok(ClientMessage::Request {
                id,
                method,
                params: envelope.params,
            }),
            (None, Some(method)) if !method.is_empty() => Ok(ClientMessage::Notification {
                method,
                params: envelope.params,
            }),
            (Some(id), None) if envelope.result.is_some() || envelope.error.is_some() => {
                Ok(ClientMessage::Response { id })
            }
            _ => Err(GatewayError::Protocol(
                "message is neither a request, a notification, nor a response".into(),
            )),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| GatewayError::Protocol(format!("invalid JSON: {}", e)))?;
        Self::parse(value)
    }
}

/// A JSON-RPC response sent down the client's stream.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: RequestId, error: McpError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_result(id: RequestId, result: Result<Value, McpError>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::error(id, error),
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| GatewayError::Protocol(format!("failed to encode response: {}", e)))
    }
}

/// Pick the protocol version to answer `initialize` with.
///
/// Echo the client's version when supported, otherwise offer the newest.
pub fn negotiate_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|v| SUPPORTED_PROTOCOL_VERSIONS.iter().copied().find(|s| *s == v))
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        let msg = ClientMessage::parse(json!({
            "jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "send_command"}
        }))
        .unwrap();
        match msg {
            ClientMessage::Request { id, method, params } => {
                assert_eq!(id, RequestId::Number(7));
                assert_eq!(method, "tools/call");
                assert_eq!(params.unwrap()["name"], "send_command");
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_string_id() {
        let msg = ClientMessage::parse(json!({"jsonrpc": "2.0", "id": "abc", "method": "ping"})).unwrap();
        assert!(matches!(msg, ClientMessage::Request { id: RequestId::String(s), .. } if s == "abc"));
    }

    #[test]
    fn test_parse_notification() {
        let msg = ClientMessage::parse(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Notification {
                method: "notifications/initialized".into(),
                params: None
            }
        );
    }

    #[test]
    fn test_parse_response() {
        let msg = ClientMessage::parse(json!({"jsonrpc": "2.0", "id": 1, "result": {}})).unwrap();
        assert_eq!(msg, ClientMessage::Response { id: RequestId::Number(1) });
    }

    #[test]
    fn test_rejects_wrong_version() {
        let result = ClientMessage::parse(json!({"jsonrpc": "1.0", "id": 1, "method": "ping"}));
        assert!(matches!(result, Err(GatewayError::Protocol(_))));
    }

    #[test]
    fn test_rejects_batch() {
        let result = ClientMessage::parse(json!([{"jsonrpc": "2.0", "id": 1, "method": "ping"}]));
        assert!(matches!(result, Err(GatewayError::Protocol(_))));
    }

    #[test]
    fn test_rejects_null_id_request() {
        let result = ClientMessage::parse(json!({"jsonrpc": "2.0", "id": null}));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_slice_invalid_json() {
        let result = ClientMessage::from_slice(b"{not json");
        assert!(matches!(result, Err(GatewayError::Protocol(msg)) if msg.starts_with("invalid JSON")));
    }

    #[test]
    fn test_response_serialization() {
        let ok = JsonRpcResponse::success(RequestId::Number(3), json!({"tools": []}));
        let value: Value = serde_json::from_str(&ok.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 3, "result": {"tools": []}}));

        let err = JsonRpcResponse::error(
            RequestId::String("x".into()),
            McpError::invalid_params("bad", None),
        );
        let value: Value = serde_json::from_str(&err.to_json().unwrap()).unwrap();
        assert_eq!(value["error"]["code"], -32602);
        assert_eq!(value["error"]["message"], "bad");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_negotiate_version() {
        assert_eq!(negotiate_version(Some("2024-11-05")), "2024-11-05");
        assert_eq!(negotiate_version(Some("1999-01-01")), SUPPORTED_PROTOCOL_VERSIONS[0]);
        assert_eq!(negotiate_version(None), SUPPORTED_PROTOCOL_VERSIONS[0]);
    }
}
