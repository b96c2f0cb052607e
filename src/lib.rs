//! Netgate — MCP gateway for network devices.
//! Exposes `send_command`, `send_config`, and `send_configs` as MCP tools over
//! SSE or STDIO and runs each call on its own short-lived SSH session.

pub mod config;
pub mod device;
pub mod error;
pub mod executor;
pub mod registry;
pub mod server;

pub use config::{Credentials, GatewayConfig};
pub use device::ssh::SshSessionFactory;
pub use device::{DeviceSession, DeviceTarget, Platform, SessionFactory};
pub use error::{GatewayError, Result};
pub use executor::ToolExecutor;
pub use registry::{ToolOutput, ToolRegistry};
pub use server::handler::McpHandler;
pub use server::http::router;
pub use server::state::StreamState;
pub use server::stdio::serve_stdio;
pub use server::SessionBridge;
