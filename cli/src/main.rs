//! Netgate — MCP gateway for network devices.
//!
//! Three subcommands:
//! - `netgate serve`: SSE MCP server (`GET /sse`, `POST /messages/`, `GET /health`)
//! - `netgate stdio`: STDIO transport for STDIO-based MCP clients
//! - `netgate tools`: print the tool table and exit

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use nimbus_netgate::{
    Credentials, DeviceSession, DeviceTarget, GatewayConfig, GatewayError, McpHandler,
    SessionBridge, SessionFactory, SshSessionFactory, ToolExecutor, ToolRegistry,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Netgate — MCP gateway for network devices.
#[derive(Parser)]
#[command(
    name = "netgate",
    version,
    about = "Netgate — MCP gateway exposing network device commands as tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over SSE
    Serve {
        /// Path to netgate.toml [default: ./netgate.toml or ~/.config/netgate/netgate.toml]
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// HTTP port to listen on [default: 8080, or listener.port from config]
        #[arg(short, long)]
        port: Option<u16>,
        /// Bind address [default: 0.0.0.0, or listener.host from config]
        #[arg(long)]
        host: Option<String>,
    },
    /// Serve MCP over STDIO
    Stdio {
        /// Path to netgate.toml [default: ./netgate.toml or ~/.config/netgate/netgate.toml]
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the tools this gateway exposes
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for the STDIO transport
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();

    // Ctrl-C cancels the root token for graceful shutdown
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutting down Netgate...");
        cancel_for_signal.cancel();
    });

    match cli.command {
        Commands::Serve { config, port, host } => {
            let config = load_config(resolve_config(config)).await?;
            run_serve(config, host, port, cancel).await?;
        }
        Commands::Stdio { config } => {
            let config = load_config(resolve_config(config)).await?;
            run_stdio(config, cancel).await?;
        }
        Commands::Tools => print_tools(),
    }

    Ok(())
}

/// Wire credentials, SSH factory, executor, registry, and handler into a bridge.
fn build_bridge(config: &GatewayConfig, cancel: &CancellationToken) -> Result<SessionBridge> {
    let credentials = Credentials::from_env(config.device.strict_host_key_checking)
        .map_err(|e| anyhow::anyhow!("Failed to load device credentials: {}", e))?;
    let factory = SshSessionFactory::new(Arc::new(credentials), config.device.clone());
    let registry = ToolRegistry::builtin(ToolExecutor::new(Arc::new(factory)));
    let handler = McpHandler::new(Arc::new(registry));
    Ok(SessionBridge::new(handler, cancel.child_token()))
}

/// Serve MCP over SSE until Ctrl-C.
async fn run_serve(
    config: GatewayConfig,
    host: Option<String>,
    port: Option<u16>,
    cancel: CancellationToken,
) -> Result<()> {
    let bridge = build_bridge(&config, &cancel)?;
    let app = nimbus_netgate::router(bridge, config.sse.keep_alive());

    let host = host.unwrap_or(config.listener.host);
    let port = port.unwrap_or(config.listener.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    tracing::info!(host = %host, port = %port, "Netgate SSE server listening");
    tracing::info!("Connect your MCP client to http://{}:{}/sse", host, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| anyhow::anyhow!("Netgate HTTP server error: {}", e))?;

    tracing::info!("Netgate SSE server stopped");
    Ok(())
}

/// Serve a single MCP client over stdin/stdout.
async fn run_stdio(config: GatewayConfig, cancel: CancellationToken) -> Result<()> {
    let bridge = build_bridge(&config, &cancel)?;
    nimbus_netgate::serve_stdio(&bridge)
        .await
        .map_err(|e| anyhow::anyhow!("Netgate stdio transport error: {}", e))?;
    tracing::info!("Netgate stdio transport completed");
    Ok(())
}

/// Session factory for commands that only inspect the tool table.
struct OfflineFactory;

impl SessionFactory for OfflineFactory {
    fn create(&self, target: &DeviceTarget) -> nimbus_netgate::Result<Box<dyn DeviceSession>> {
        Err(GatewayError::Connection(
            target.host().to_string(),
            "device access is disabled for this command".to_string(),
        ))
    }
}

fn print_tools() {
    let registry = ToolRegistry::builtin(ToolExecutor::new(Arc::new(OfflineFactory)));
    for spec in registry.specs() {
        let required = spec
            .input_schema()
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| {
                r.iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        println!("{}({})", spec.name, required);
        println!("    {}", spec.description);
    }
}

/// Resolve config file path: explicit flag → ./netgate.toml → ~/.config/netgate/netgate.toml.
///
/// Unlike the flag, the fallbacks are optional; without a file the defaults apply.
fn resolve_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    let local = Path::new("netgate.toml");
    if local.exists() {
        return Some(local.to_path_buf());
    }

    dirs::config_dir()
        .map(|dir| dir.join("netgate").join("netgate.toml"))
        .filter(|path| path.exists())
}

/// Load and validate netgate.toml, or fall back to defaults.
async fn load_config(path: Option<PathBuf>) -> Result<GatewayConfig> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            GatewayConfig::load(&path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to load config file {:?}: {}", path, e))
        }
        None => {
            tracing::debug!("no config file found, using defaults");
            Ok(GatewayConfig::default())
        }
    }
}
