//! Domain processors.
//!
//! Each processor owns one family of MCP methods. They keep no per-request
//! state: everything they read comes from the current catalog snapshot or
//! from the bridge manager.

pub mod prompts;
pub mod resources;
pub mod system;
pub mod tools;

pub use prompts::PromptProcessor;
pub use resources::ResourceProcessor;
pub use system::SystemProcessor;
pub use tools::ToolProcessor;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::protocol::McpError;

/// Decodes request `params`. Absent params are an error.
pub(crate) fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, McpError> {
    let params = params.ok_or_else(|| McpError::InvalidParams("Missing params".to_string()))?;
    serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))
}

pub(crate) fn to_result<T: Serialize>(value: T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::InternalError(e.to_string()))
}

/// Keeps the upstream items that decode as `T`, dropping malformed ones.
pub(crate) fn decode_listing<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(listing) => Some(listing),
            Err(e) => {
                tracing::debug!("Skipping malformed upstream listing: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::ToolsCallParams;
    use serde_json::json;

    #[test]
    fn test_parse_params_missing() {
        let err = parse_params::<ToolsCallParams>(None).unwrap_err();
        assert_eq!(err.code(), -32602);
    }

    #[test]
    fn test_parse_params_missing_field() {
        let err = parse_params::<ToolsCallParams>(Some(json!({"arguments": {}}))).unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(ref m) if m.contains("name")));
    }
}
