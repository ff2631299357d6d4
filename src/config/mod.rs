mod file_config;

pub use file_config::{BridgeFileConfig, FileConfig};

use crate::bridge::config::{BRIDGE_CONFIG_ENV, DEFAULT_BRIDGE_CONFIG_FILE};
use crate::bridge::DEFAULT_BRIDGE_TIMEOUT_MS;
use crate::server::{config::DEFAULT_MCP_PATH, RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// Which client-facing transport the process serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TransportMode {
    /// HTTP POST, SSE and WebSocket on one listener
    #[default]
    Http,
    /// Newline-delimited JSON-RPC on stdin/stdout
    Stdio,
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub host: String,
    pub port: u16,
    pub mcp_path: String,
    pub transport: TransportMode,
    pub logging_level: RequestsLoggingLevel,
    pub bridge_config: Option<PathBuf>,
    pub bridge_timeout_ms: u64,
    pub no_watch: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            host: server.host,
            port: server.port,
            mcp_path: DEFAULT_MCP_PATH.to_string(),
            transport: TransportMode::Http,
            logging_level: RequestsLoggingLevel::Path,
            bridge_config: None,
            bridge_timeout_ms: DEFAULT_BRIDGE_TIMEOUT_MS,
            no_watch: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub transport: TransportMode,
    pub bridge: BridgeSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    pub config_path: PathBuf,
    pub timeout: Duration,
    pub watch: bool,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present. The bridge file path
    /// falls back to `MCP_BRIDGE_CONFIG`, then to `mcp-bridge.json`.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let env_bridge_config = std::env::var(BRIDGE_CONFIG_ENV).ok();
        Self::resolve_with_env(cli, file_config, env_bridge_config)
    }

    fn resolve_with_env(
        cli: &CliConfig,
        file_config: Option<FileConfig>,
        env_bridge_config: Option<String>,
    ) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let host = file.host.unwrap_or_else(|| cli.host.clone());
        let port = file.port.unwrap_or(cli.port);
        if port == 0 {
            bail!("port must be non-zero");
        }

        let mcp_path = file.mcp_path.unwrap_or_else(|| cli.mcp_path.clone());
        if !mcp_path.starts_with('/') {
            bail!("mcp_path must start with '/': {:?}", mcp_path);
        }

        let transport = match file.transport {
            Some(value) => match TransportMode::from_str(&value, true) {
                Ok(mode) => mode,
                Err(_) => bail!("Unknown transport in config file: {:?}", value),
            },
            None => cli.transport,
        };

        let requests_logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let bridge_file = file.bridge.unwrap_or_default();
        let config_path = bridge_file
            .config_path
            .map(PathBuf::from)
            .or_else(|| cli.bridge_config.clone())
            .or_else(|| env_bridge_config.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BRIDGE_CONFIG_FILE));

        let timeout_ms = bridge_file.timeout_ms.unwrap_or(cli.bridge_timeout_ms);
        if timeout_ms == 0 {
            bail!("bridge timeout must be greater than zero");
        }

        let watch = bridge_file.watch.unwrap_or(!cli.no_watch);

        Ok(Self {
            server: ServerConfig {
                requests_logging_level,
                host,
                port,
                mcp_path,
            },
            transport,
            bridge: BridgeSettings {
                config_path,
                timeout: Duration::from_millis(timeout_ms),
                watch,
            },
        })
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
