//! McpHandler — answers MCP methods from the tool registry.
//!
//! Stateless apart from the shared registry; one clone per streaming session.
//! The session loop decides *when* a method may run; this type decides *what*
//! it returns.

use std::sync::Arc;
use std::time::Instant;

use rmcp::ErrorData as McpError;
use rmcp::model::{
    CallToolRequestParams, Implementation, ListToolsResult, ServerCapabilities, ServerInfo,
};
use serde_json::Value;

use crate::registry::ToolRegistry;
use crate::server::protocol::negotiate_version;

pub const SERVER_NAME: &str = "netgate";

/// MCP method handler backed by a [`ToolRegistry`].
#[derive(Clone)]
pub struct McpHandler {
    registry: Arc<ToolRegistry>,
}

fn encode<T: serde::Serialize>(value: T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::internal_error(e.to_string(), None))
}

impl McpHandler {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Server metadata: name "netgate", tool capabilities enabled.
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: SERVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Netgate runs show commands and configuration changes on network devices over SSH."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    /// Answer `initialize`, echoing the client's protocol version when supported.
    pub fn initialize(&self, params: Option<&Value>) -> Result<Value, McpError> {
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str);
        let mut result = encode(self.server_info())?;
        result["protocolVersion"] = Value::String(negotiate_version(requested).to_string());
        Ok(result)
    }

    /// Answer `tools/list` with every registered tool.
    pub fn list_tools(&self) -> Result<Value, McpError> {
        encode(ListToolsResult {
            tools: self.registry.tools(),
            next_cursor: None,
            meta: None,
        })
    }

    /// Answer `tools/call` by dispatching through the registry.
    ///
    /// Only a malformed request envelope is a JSON-RPC error. Tool failures,
    /// unknown tool names included, come back as results with `isError: true`.
    pub async fn call_tool(&self, params: Option<Value>) -> Result<Value, McpError> {
        let params: CallToolRequestParams = params
            .ok_or_else(|| McpError::invalid_params("tools/call requires params", None))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| McpError::invalid_params(e.to_string(), None))
            })?;

        let tool = params.name.to_string();
        let start = Instant::now();
        let outcome = self.registry.dispatch(&tool, params.arguments).await;
        let elapsed = start.elapsed().as_millis();

        match outcome {
            Ok(output) => {
                tracing::info!(tool = %tool, duration_ms = %elapsed, "tool call completed");
                encode(output.into_call_result())
            }
            Err(e) => {
                tracing::warn!(
                    tool = %tool,
                    duration_ms = %elapsed,
                    kind = e.kind().as_str(),
                    error = %e,
                    "tool call failed"
                );
                encode(e.into_call_result())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockDevice, MockReply};
    use crate::executor::ToolExecutor;
    use serde_json::json;

    fn handler(device: &Arc<MockDevice>) -> McpHandler {
        McpHandler::new(Arc::new(ToolRegistry::builtin(ToolExecutor::new(
            device.factory(),
        ))))
    }

    #[test]
    fn test_server_info() {
        let device = MockDevice::new();
        let info = handler(&device).server_info();
        assert_eq!(info.server_info.name, "netgate");
        assert!(info.capabilities.tools.is_some(), "tools capability should be enabled");
        assert!(info.instructions.is_some());
    }

    #[test]
    fn test_initialize_echoes_supported_version() {
        let device = MockDevice::new();
        let result = handler(&device)
            .initialize(Some(&json!({"protocolVersion": "2024-11-05", "capabilities": {}})))
            .unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "netgate");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[test]
    fn test_list_tools() {
        let device = MockDevice::new();
        let result = handler(&device).list_tools().unwrap();
        let names: Vec<&str> = result["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["send_command", "send_config", "send_configs"]);
        assert!(result["tools"][0]["inputSchema"]["properties"]["hostname"].is_object());
    }

    #[tokio::test]
    async fn test_call_tool_success() {
        let device = MockDevice::new();
        device.reply("show hostname", MockReply::output("Hostname: R1"));
        let result = handler(&device)
            .call_tool(Some(json!({
                "name": "send_command",
                "arguments": {"hostname": "r1", "platform": "cisco_iosxe", "command": "show hostname"}
            })))
            .await
            .unwrap();
        assert_eq!(result["content"][0]["text"], "Hostname: R1");
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn test_call_tool_unknown_is_error_result() {
        let device = MockDevice::new();
        let result = handler(&device)
            .call_tool(Some(json!({"name": "send_reboot", "arguments": {}})))
            .await
            .unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("send_reboot"));
        assert_eq!(result["structuredContent"]["kind"], "validation");
        assert_eq!(device.created(), 0);
    }

    #[tokio::test]
    async fn test_call_tool_connection_failure_is_error_result() {
        let device = MockDevice::new();
        device.fail_connect(crate::error::GatewayError::Authentication(
            "r1".into(),
            "admin".into(),
        ));
        let result = handler(&device)
            .call_tool(Some(json!({
                "name": "send_command",
                "arguments": {"hostname": "r1", "platform": "cisco_iosxe", "command": "show clock"}
            })))
            .await
            .unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["structuredContent"]["kind"], "connection");
        assert_eq!(device.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_call_tool_missing_params() {
        let device = MockDevice::new();
        let err = handler(&device).call_tool(None).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }
}
