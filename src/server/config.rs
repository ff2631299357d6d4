use super::RequestsLoggingLevel;

/// Default MCP endpoint path
pub const DEFAULT_MCP_PATH: &str = "/mcp";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub host: String,
    pub port: u16,
    /// Path of the JSON-RPC endpoint. The WebSocket endpoint is `<mcp_path>/ws`.
    pub mcp_path: String,
}

impl ServerConfig {
    pub fn ws_path(&self) -> String {
        format!("{}/ws", self.mcp_path.trim_end_matches('/'))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            host: "127.0.0.1".to_string(),
            port: 3030,
            mcp_path: DEFAULT_MCP_PATH.to_string(),
        }
    }
}
