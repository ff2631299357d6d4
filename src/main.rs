use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_gateway::bridge::{ConfigWatcher, DEFAULT_BRIDGE_TIMEOUT_MS};
use mcp_gateway::config::{AppConfig, CliConfig, FileConfig, TransportMode};
use mcp_gateway::mcp::protocol::ServerInfo;
use mcp_gateway::server::{self, config::DEFAULT_MCP_PATH, run_server, serve_stdio};
use mcp_gateway::{BridgeManager, DefaultTransportFactory, McpEngine, RequestsLoggingLevel};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in it override the CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Address to bind the HTTP listener to.
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3030)]
    pub port: u16,

    /// Path of the JSON-RPC endpoint. WebSocket clients connect to `<path>/ws`.
    #[clap(long, default_value = DEFAULT_MCP_PATH)]
    pub mcp_path: String,

    /// Client-facing transport.
    #[clap(long, value_enum, default_value = "http")]
    pub transport: TransportMode,

    /// Path of the bridge file (`{"mcpServers": {...}}`).
    /// Defaults to $MCP_BRIDGE_CONFIG, then ./mcp-bridge.json.
    #[clap(long)]
    pub bridge_config: Option<PathBuf>,

    /// Per-call timeout against upstream servers, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_BRIDGE_TIMEOUT_MS)]
    pub bridge_timeout_ms: u64,

    /// Do not reload bridges when the bridge file changes.
    #[clap(long)]
    pub no_watch: bool,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            host: self.host.clone(),
            port: self.port,
            mcp_path: self.mcp_path.clone(),
            transport: self.transport,
            logging_level: self.logging_level.clone(),
            bridge_config: self.bridge_config.clone(),
            bridge_timeout_ms: self.bridge_timeout_ms,
            no_watch: self.no_watch,
        }
    }
}

fn init_logging(transport: TransportMode) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("LOG_LEVEL")
        .from_env_lossy();

    // stdout carries protocol traffic in STDIO mode
    let result = match transport {
        TransportMode::Http => tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(filter)
            .try_init(),
        TransportMode::Stdio => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .with(filter)
            .try_init(),
    };
    result.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let app_config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    init_logging(app_config.transport)?;

    info!("Initializing metrics...");
    server::metrics::init_metrics();

    let factory = DefaultTransportFactory::new().context("Failed to build HTTP client")?;
    let bridges = Arc::new(
        BridgeManager::new(Arc::new(factory), app_config.bridge.timeout)
            .with_config_path(&app_config.bridge.config_path),
    );
    info!(
        "Loading bridges from {:?} (timeout {:?})",
        app_config.bridge.config_path, app_config.bridge.timeout
    );
    if let Err(e) = bridges.reload_from_file().await {
        warn!("Starting without bridges: {}", e);
    }

    let _watcher = if app_config.bridge.watch {
        match ConfigWatcher::start(bridges.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Bridge hot-reload disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let engine = Arc::new(McpEngine::new(
        ServerInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        Some(bridges),
    ));

    let result = match app_config.transport {
        TransportMode::Http => {
            run_server(app_config.server.clone(), engine.clone(), shutdown_signal()).await
        }
        TransportMode::Stdio => {
            info!("Serving MCP over stdio");
            tokio::select! {
                result = serve_stdio(engine.clone(), tokio::io::stdin(), tokio::io::stdout()) => result,
                _ = shutdown_signal() => Ok(()),
            }
        }
    };

    tokio::time::timeout(Duration::from_secs(5), engine.shutdown())
        .await
        .unwrap_or_else(|_| warn!("Bridges did not close in time"));
    result
}
