//! `tools/list` and `tools/call`.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{parse_params, to_result};
use crate::bridge::BridgeManager;
use crate::mcp::catalog::CatalogStore;
use crate::mcp::protocol::{McpError, ToolsCallParams, ToolsCallResult, ToolsListResult};
use crate::mcp::registry::RegisteredTool;
use crate::mcp::tool_builder::split_arguments;

pub struct ToolProcessor {
    catalog: Arc<CatalogStore>,
    bridges: Option<Arc<BridgeManager>>,
}

impl ToolProcessor {
    pub fn new(catalog: Arc<CatalogStore>, bridges: Option<Arc<BridgeManager>>) -> Self {
        Self { catalog, bridges }
    }

    /// Local tools followed by bridge tools. Local names always win.
    pub async fn list(&self) -> Result<Value, McpError> {
        let snapshot = self.catalog.snapshot();
        let mut tools: Vec<_> = snapshot
            .tools()
            .iter()
            .map(|t| t.tool.to_definition())
            .collect();

        if let Some(bridges) = &self.bridges {
            let reserved: HashSet<String> =
                snapshot.tools().iter().map(|t| t.tool.name.clone()).collect();
            let bridged = bridges.list_tools(&reserved).await;
            tools.extend(bridged.iter().map(|t| t.to_definition()));
        }

        to_result(ToolsListResult { tools })
    }

    pub async fn call(&self, params: Option<Value>) -> Result<Value, McpError> {
        let params: ToolsCallParams = parse_params(params)?;
        let arguments = params.arguments.unwrap_or_else(|| json!({}));

        let snapshot = self.catalog.snapshot();
        if let Some(registered) = snapshot.tool(&params.name) {
            let arguments = match arguments {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                _ => {
                    return Err(McpError::InvalidParams(
                        "Tool arguments must be an object".to_string(),
                    ))
                }
            };
            return to_result(call_local(registered, &arguments).await);
        }

        if let Some(bridges) = &self.bridges {
            match bridges.call_tool(&params.name, arguments).await {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => debug!("No bridge serves tool {}", params.name),
                Err(e) => return Err(e.into()),
            }
        }

        Err(McpError::ToolNotFound(params.name))
    }
}

async fn call_local(registered: &RegisteredTool, arguments: &Map<String, Value>) -> ToolsCallResult {
    let request = split_arguments(&registered.tool, arguments);
    match registered.processor.process(request).await {
        Ok(response) if response.status < 400 => ToolsCallResult::text(render_body(&response.body)),
        Ok(response) => ToolsCallResult::error(format!(
            "HTTP {}: {}",
            response.status,
            render_body(&response.body)
        )),
        Err(e) => {
            warn!("Tool {} failed: {}", registered.tool.name, e);
            ToolsCallResult::error(e.to_string())
        }
    }
}

fn render_body(body: &Value) -> String {
    match body {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
