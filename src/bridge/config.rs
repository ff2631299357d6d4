//! Bridge configuration file.
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "alpha": { "url": "https://alpha.example" },
//!     "local": { "command": "my-mcp", "args": ["--stdio"], "env": { "DEBUG": "1" } },
//!     "off":   { "url": "http://localhost:9000", "disabled": true }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::error::BridgeError;

/// Default bridge file name, resolved against the working directory.
pub const DEFAULT_BRIDGE_CONFIG_FILE: &str = "mcp-bridge.json";

/// Environment variable overriding the bridge file location.
pub const BRIDGE_CONFIG_ENV: &str = "MCP_BRIDGE_CONFIG";

#[derive(Debug, Deserialize)]
struct BridgeConfigFile {
    #[serde(rename = "mcpServers", default)]
    mcp_servers: BTreeMap<String, RawServerEntry>,
}

#[derive(Debug, Deserialize)]
struct RawServerEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    disabled: bool,
}

/// How to reach an upstream server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEndpoint {
    Http {
        url: String,
        headers: HashMap<String, String>,
    },
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
}

/// One enabled entry of the bridge file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeServerConfig {
    pub name: String,
    pub endpoint: BridgeEndpoint,
}

impl BridgeServerConfig {
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: BridgeEndpoint::Http {
                url: url.into(),
                headers: HashMap::new(),
            },
        }
    }

    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: BridgeEndpoint::Stdio {
                command: command.into(),
                args,
                env: HashMap::new(),
            },
        }
    }
}

/// Parses a bridge file. Entries come back sorted by name; disabled entries
/// are skipped. Blank text is an error: editors truncate the file before
/// writing it, and only a missing file means "no bridges".
pub fn parse_bridge_config(text: &str) -> Result<Vec<BridgeServerConfig>, BridgeError> {
    if text.trim().is_empty() {
        return Err(BridgeError::Config("Bridge config is empty".to_string()));
    }

    let file: BridgeConfigFile = serde_json::from_str(text)
        .map_err(|e| BridgeError::Config(format!("Invalid bridge config: {}", e)))?;

    let mut servers = Vec::with_capacity(file.mcp_servers.len());
    for (name, entry) in file.mcp_servers {
        if entry.disabled {
            debug!("Bridge {} is disabled", name);
            continue;
        }
        let endpoint = match (entry.url, entry.command) {
            (Some(url), None) => BridgeEndpoint::Http {
                url: url.trim_end_matches('/').to_string(),
                headers: entry.headers,
            },
            (None, Some(command)) => BridgeEndpoint::Stdio {
                command,
                args: entry.args,
                env: entry.env,
            },
            (Some(_), Some(_)) => {
                return Err(BridgeError::Config(format!(
                    "Bridge {} has both url and command",
                    name
                )))
            }
            (None, None) => {
                return Err(BridgeError::Config(format!(
                    "Bridge {} needs either url or command",
                    name
                )))
            }
        };
        servers.push(BridgeServerConfig { name, endpoint });
    }

    Ok(servers)
}

/// Loads the bridge file. A missing file means "no bridges".
pub fn load_bridge_config(path: &Path) -> Result<Vec<BridgeServerConfig>, BridgeError> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_bridge_config(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No bridge config at {:?}", path);
            Ok(Vec::new())
        }
        Err(e) => Err(BridgeError::Config(format!(
            "Failed to read {:?}: {}",
            path, e
        ))),
    }
}
