use std::time::Duration;

use thiserror::Error;

use crate::mcp::protocol::{error_codes, McpError};

/// Errors talking to an upstream MCP server.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("No MCP server at {0}")]
    NotMcpServer(String),

    #[error("Upstream error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Bridge is closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Whether the upstream answered at all. An RPC error means the peer is
    /// healthy but rejected this particular call.
    pub fn is_rpc(&self) -> bool {
        matches!(self, BridgeError::Rpc { .. })
    }

    /// Whether the upstream rejected the call because it does not know the
    /// tool name, as opposed to rejecting the arguments.
    pub fn is_unknown_tool(&self) -> bool {
        match self {
            BridgeError::Rpc { code, message } => {
                let message = message.to_ascii_lowercase();
                *code == error_codes::METHOD_NOT_FOUND
                    || message.contains("unknown tool")
                    || message.contains("not found")
            }
            _ => false,
        }
    }
}

impl From<BridgeError> for McpError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Rpc { code, message } if error_codes::is_standard(code) => {
                McpError::Upstream { code, message }
            }
            other => McpError::InternalError(other.to_string()),
        }
    }
}
