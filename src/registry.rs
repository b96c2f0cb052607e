//! ToolRegistry — the dispatch table behind every tool call.
//!
//! Built once at startup from a fixed list of tools and never mutated
//! afterwards. Each entry pairs a tool name with its description, its JSON
//! input schema, and a handler that decodes arguments and runs the executor.
//! Argument problems are reported before any device connection is attempted.

use std::sync::Arc;

use futures::future::BoxFuture;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::device::DeviceTarget;
use crate::error::GatewayError;
use crate::executor::{ToolExecutor, ensure_non_empty};

/// Result payload of a successful tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    /// `send_command` / `send_config`
    Single(String),
    /// `send_configs`, one entry per command in input order
    Batch(Vec<String>),
}

impl ToolOutput {
    /// Render as an MCP tool result.
    ///
    /// Text content carries device output verbatim; `structured_content`
    /// carries `{"output": ...}` or `{"outputs": [...]}`.
    pub fn into_call_result(self) -> CallToolResult {
        let (content, structured) = match self {
            ToolOutput::Single(output) => {
                let structured = json!({ "output": output });
                (vec![Content::text(output)], structured)
            }
            ToolOutput::Batch(outputs) => {
                let structured = json!({ "outputs": outputs });
                (outputs.into_iter().map(Content::text).collect(), structured)
            }
        };
        CallToolResult {
            content,
            is_error: Some(false),
            structured_content: Some(structured),
            meta: None,
        }
    }
}

type ToolHandler = for<'a> fn(&'a ToolExecutor, JsonObject) -> BoxFuture<'a, crate::Result<ToolOutput>>;

/// One row of the dispatch table.
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    input_schema: Arc<JsonObject>,
    handler: ToolHandler,
}

impl ToolSpec {
    /// MCP descriptor for `tools/list`.
    pub fn descriptor(&self) -> Tool {
        Tool {
            name: self.name.into(),
            title: None,
            description: Some(self.description.into()),
            input_schema: self.input_schema.clone(),
            output_schema: None,
            annotations: None,
            icons: None,
            meta: None,
        }
    }

    pub fn input_schema(&self) -> &JsonObject {
        &self.input_schema
    }
}

#[derive(Debug, Deserialize)]
struct CommandParams {
    hostname: String,
    platform: String,
    command: String,
}

#[derive(Debug, Deserialize)]
struct BatchParams {
    hostname: String,
    platform: String,
    commands: Vec<String>,
}

fn decode_params<T: DeserializeOwned>(tool: &str, arguments: JsonObject) -> crate::Result<T> {
    serde_json::from_value(serde_json::Value::Object(arguments))
        .map_err(|e| GatewayError::InvalidParams(tool.to_string(), e.to_string()))
}

fn ensure_command(tool: &str, command: &str) -> crate::Result<()> {
    if command.trim().is_empty() {
        return Err(GatewayError::InvalidParams(
            tool.to_string(),
            "'command' must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn send_command(executor: &ToolExecutor, arguments: JsonObject) -> BoxFuture<'_, crate::Result<ToolOutput>> {
    Box::pin(async move {
        let params: CommandParams = decode_params("send_command", arguments)?;
        ensure_command("send_command", &params.command)?;
        let target = DeviceTarget::new(&params.hostname, &params.platform)?;
        executor
            .run_command(&target, &params.command)
            .await
            .map(ToolOutput::Single)
    })
}

fn send_config(executor: &ToolExecutor, arguments: JsonObject) -> BoxFuture<'_, crate::Result<ToolOutput>> {
    Box::pin(async move {
        let params: CommandParams = decode_params("send_config", arguments)?;
        ensure_command("send_config", &params.command)?;
        let target = DeviceTarget::new(&params.hostname, &params.platform)?;
        executor
            .run_config(&target, &params.command)
            .await
            .map(ToolOutput::Single)
    })
}

fn send_configs(executor: &ToolExecutor, arguments: JsonObject) -> BoxFuture<'_, crate::Result<ToolOutput>> {
    Box::pin(async move {
        let params: BatchParams = decode_params("send_configs", arguments)?;
        ensure_non_empty("send_configs", &params.commands)?;
        for command in &params.commands {
            ensure_command("send_configs", command)?;
        }
        let target = DeviceTarget::new(&params.hostname, &params.platform)?;
        executor
            .run_config_batch(&target, &params.commands)
            .await
            .map(ToolOutput::Batch)
    })
}

fn schema(value: serde_json::Value) -> Arc<JsonObject> {
    match value {
        serde_json::Value::Object(map) => Arc::new(map),
        _ => Arc::new(JsonObject::new()),
    }
}

fn target_properties() -> serde_json::Value {
    json!({
        "hostname": {
            "type": "string",
            "description": "Device hostname or IP address"
        },
        "platform": {
            "type": "string",
            "description": "Platform of the device (e.g. \"cisco_iosxe\")",
            "enum": crate::device::Platform::ALL.iter().map(|p| p.name()).collect::<Vec<_>>()
        }
    })
}

fn command_schema(command_description: &str) -> Arc<JsonObject> {
    let mut properties = target_properties();
    properties["command"] = json!({
        "type": "string",
        "description": command_description
    });
    schema(json!({
        "type": "object",
        "properties": properties,
        "required": ["hostname", "platform", "command"]
    }))
}

fn batch_schema() -> Arc<JsonObject> {
    let mut properties = target_properties();
    properties["commands"] = json!({
        "type": "array",
        "items": { "type": "string" },
        "minItems": 1,
        "description": "Configuration commands to apply, in order"
    });
    schema(json!({
        "type": "object",
        "properties": properties,
        "required": ["hostname", "platform", "commands"]
    }))
}

/// Static dispatch table mapping tool names to executor calls.
pub struct ToolRegistry {
    executor: ToolExecutor,
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    /// Build the table of built-in device tools.
    pub fn builtin(executor: ToolExecutor) -> Self {
        let tools = vec![
            ToolSpec {
                name: "send_command",
                description: "Send a single command to a network device and return the output.",
                input_schema: command_schema("Command to execute on the device"),
                handler: send_command,
            },
            ToolSpec {
                name: "send_config",
                description: "Send a single configuration command (e.g. \"interface GigabitEthernet0/0\" \
                              or \"router ospf 1\") to a network device and return the output.",
                input_schema: command_schema("Configuration command to execute on the device"),
                handler: send_config,
            },
            ToolSpec {
                name: "send_configs",
                description: "Send multiple configuration commands that are not global commands \
                              (e.g. [\"router bgp 65000\", \"bgp router-id 192.168.1.1\"]) to a \
                              network device in one session and return one output per command.",
                input_schema: batch_schema(),
                handler: send_configs,
            },
        ];
        Self { executor, tools }
    }

    /// Tool descriptors in registration order.
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolSpec::descriptor).collect()
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name).collect()
    }

    /// Look up `name` and run its handler.
    ///
    /// Unknown names fail with `UnknownTool`; malformed arguments with
    /// `InvalidParams`/`InvalidTarget`. Executor errors pass through unchanged.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> crate::Result<ToolOutput> {
        let spec = self
            .tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| GatewayError::UnknownTool(name.to_string()))?;
        (spec.handler)(&self.executor, arguments.unwrap_or_default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockDevice, MockReply};

    fn args(value: serde_json::Value) -> Option<JsonObject> {
        value.as_object().cloned()
    }

    fn registry(device: &Arc<MockDevice>) -> ToolRegistry {
        ToolRegistry::builtin(ToolExecutor::new(device.factory()))
    }

    #[test]
    fn test_builtin_tool_names() {
        let device = MockDevice::new();
        assert_eq!(
            registry(&device).tool_names(),
            vec!["send_command", "send_config", "send_configs"]
        );
    }

    #[test]
    fn test_descriptors_require_target_fields() {
        let device = MockDevice::new();
        let registry = registry(&device);
        for spec in registry.specs() {
            let required = spec.input_schema()["required"].as_array().unwrap();
            assert!(required.contains(&json!("hostname")));
            assert!(required.contains(&json!("platform")));
        }
        let tools = registry.tools();
        assert_eq!(tools[2].name.as_ref(), "send_configs");
        assert!(tools[2].description.is_some());
    }

    #[tokio::test]
    async fn test_unknown_tool_performs_no_io() {
        let device = MockDevice::new();
        let result = registry(&device)
            .dispatch("send_reboot", args(json!({"hostname": "r1", "platform": "cisco_iosxe"})))
            .await;
        assert!(matches!(result, Err(GatewayError::UnknownTool(name)) if name == "send_reboot"));
        assert_eq!(device.created(), 0);
        assert_eq!(device.connects(), 0);
    }

    #[tokio::test]
    async fn test_missing_param_fails_before_connect() {
        let device = MockDevice::new();
        let result = registry(&device)
            .dispatch("send_command", args(json!({"hostname": "r1", "platform": "cisco_iosxe"})))
            .await;
        assert!(
            matches!(result, Err(GatewayError::InvalidParams(tool, msg)) if tool == "send_command" && msg.contains("command"))
        );
        assert_eq!(device.connects(), 0);
    }

    #[tokio::test]
    async fn test_mistyped_param_fails_before_connect() {
        let device = MockDevice::new();
        let result = registry(&device)
            .dispatch(
                "send_configs",
                args(json!({"hostname": "r1", "platform": "cisco_iosxe", "commands": "router bgp 1"})),
            )
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidParams(..))));
        assert_eq!(device.connects(), 0);
    }

    #[tokio::test]
    async fn test_no_arguments_is_invalid_params() {
        let device = MockDevice::new();
        let result = registry(&device).dispatch("send_config", None).await;
        assert!(matches!(result, Err(GatewayError::InvalidParams(..))));
    }

    #[tokio::test]
    async fn test_empty_hostname_for_every_tool() {
        let device = MockDevice::new();
        let registry = registry(&device);
        let calls = [
            ("send_command", json!({"hostname": "", "platform": "cisco_iosxe", "command": "show clock"})),
            ("send_config", json!({"hostname": "", "platform": "cisco_iosxe", "command": "hostname R1"})),
            ("send_configs", json!({"hostname": "", "platform": "cisco_iosxe", "commands": ["hostname R1"]})),
        ];
        for (tool, arguments) in calls {
            let result = registry.dispatch(tool, args(arguments)).await;
            assert!(
                matches!(result, Err(GatewayError::InvalidTarget(_))),
                "{tool} should reject an empty hostname"
            );
        }
        assert_eq!(device.created(), 0);
        assert_eq!(device.connects(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let device = MockDevice::new();
        let result = registry(&device)
            .dispatch(
                "send_configs",
                args(json!({"hostname": "r1", "platform": "cisco_iosxe", "commands": []})),
            )
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidParams(..))));
        assert_eq!(device.connects(), 0);
    }

    #[tokio::test]
    async fn test_send_command_output_is_verbatim() {
        let device = MockDevice::new();
        device.reply("show hostname", MockReply::output("Hostname: R1"));
        let output = registry(&device)
            .dispatch(
                "send_command",
                args(json!({"hostname": "r1", "platform": "cisco_iosxe", "command": "show hostname"})),
            )
            .await
            .unwrap();
        assert_eq!(output, ToolOutput::Single("Hostname: R1".to_string()));

        let result = serde_json::to_value(output.into_call_result()).unwrap();
        assert_eq!(result["content"][0]["text"], "Hostname: R1");
        assert_eq!(result["structuredContent"]["output"], "Hostname: R1");
        assert_eq!(device.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_send_configs_delivers_in_order() {
        let device = MockDevice::new();
        let output = registry(&device)
            .dispatch(
                "send_configs",
                args(json!({
                    "hostname": "r1",
                    "platform": "cisco_iosxe",
                    "commands": ["router bgp 65000", "bgp router-id 192.168.1.1"]
                })),
            )
            .await
            .unwrap();
        assert!(matches!(output, ToolOutput::Batch(ref outputs) if outputs.len() == 2));
        assert_eq!(
            device.received(),
            vec!["router bgp 65000", "bgp router-id 192.168.1.1"]
        );
        let result = serde_json::to_value(output.into_call_result()).unwrap();
        assert_eq!(result["structuredContent"]["outputs"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_executor_errors_propagate_unchanged() {
        let device = MockDevice::new();
        device.fail_connect(GatewayError::Authentication("r1".into(), "admin".into()));
        let result = registry(&device)
            .dispatch(
                "send_config",
                args(json!({"hostname": "r1", "platform": "cisco_iosxe", "command": "hostname R1"})),
            )
            .await;
        assert!(matches!(result, Err(GatewayError::Authentication(host, user)) if host == "r1" && user == "admin"));
        assert_eq!(device.open_sessions(), 0);
    }
}
