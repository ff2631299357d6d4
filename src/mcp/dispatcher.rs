//! JSON-RPC dispatcher.
//!
//! Validates envelopes, routes them by method to the domain processors and
//! turns every outcome into a response envelope. Transports hand raw text to
//! [`Dispatcher::process_text`]; in-process callers can use
//! [`Dispatcher::process_request`] directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use lazy_static::lazy_static;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::processors::{PromptProcessor, ResourceProcessor, SystemProcessor, ToolProcessor};
use super::protocol::{methods, McpError, McpRequest, McpResponse, RequestId, JSONRPC_VERSION};
use crate::server::metrics;

/// Every method the engine answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpMethod {
    Initialize,
    Initialized,
    Cancelled,
    Ping,
    ToolsList,
    ToolsCall,
    PromptsList,
    PromptsGet,
    ResourcesList,
    ResourcesRead,
    ResourceTemplatesList,
}

lazy_static! {
    static ref METHOD_TABLE: HashMap<&'static str, McpMethod> = McpMethod::ALL
        .iter()
        .map(|m| (m.name(), *m))
        .collect();
}

impl McpMethod {
    pub const ALL: [McpMethod; 11] = [
        McpMethod::Initialize,
        McpMethod::Initialized,
        McpMethod::Cancelled,
        McpMethod::Ping,
        McpMethod::ToolsList,
        McpMethod::ToolsCall,
        McpMethod::PromptsList,
        McpMethod::PromptsGet,
        McpMethod::ResourcesList,
        McpMethod::ResourcesRead,
        McpMethod::ResourceTemplatesList,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            McpMethod::Initialize => methods::INITIALIZE,
            McpMethod::Initialized => methods::INITIALIZED,
            McpMethod::Cancelled => methods::CANCELLED,
            McpMethod::Ping => methods::PING,
            McpMethod::ToolsList => methods::TOOLS_LIST,
            McpMethod::ToolsCall => methods::TOOLS_CALL,
            McpMethod::PromptsList => methods::PROMPTS_LIST,
            McpMethod::PromptsGet => methods::PROMPTS_GET,
            McpMethod::ResourcesList => methods::RESOURCES_LIST,
            McpMethod::ResourcesRead => methods::RESOURCES_READ,
            McpMethod::ResourceTemplatesList => methods::RESOURCES_TEMPLATES_LIST,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        METHOD_TABLE.get(name).copied()
    }
}

/// What a transport writes back for one inbound message.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DispatchOutput {
    Single(McpResponse),
    Batch(Vec<McpResponse>),
}

impl DispatchOutput {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            warn!("Failed to serialize MCP response: {}", e);
            json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": null,
                "error": {"code": -32603, "message": format!("Internal error: {}", e)},
            })
            .to_string()
        })
    }
}

pub struct Dispatcher {
    tools: ToolProcessor,
    prompts: PromptProcessor,
    resources: ResourceProcessor,
    system: Arc<SystemProcessor>,
}

impl Dispatcher {
    pub fn new(
        tools: ToolProcessor,
        prompts: PromptProcessor,
        resources: ResourceProcessor,
        system: Arc<SystemProcessor>,
    ) -> Self {
        Self {
            tools,
            prompts,
            resources,
            system,
        }
    }

    /// Entry point for raw text from a transport. `None` means nothing is to
    /// be written back (a notification, or a batch of notifications).
    pub async fn process_text(&self, text: &str) -> Option<DispatchOutput> {
        self.process_bytes(text.as_bytes()).await
    }

    /// Same as [`Dispatcher::process_text`] for frames that arrive as bytes.
    /// Invalid UTF-8 is a parse error.
    pub async fn process_bytes(&self, bytes: &[u8]) -> Option<DispatchOutput> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Array(items)) => self.process_batch(items).await,
            Ok(value) => self.process_value(value).await.map(DispatchOutput::Single),
            Err(e) => {
                debug!("Unparseable MCP message: {}", e);
                Some(DispatchOutput::Single(McpResponse::error(
                    None,
                    McpError::ParseError(e.to_string()),
                )))
            }
        }
    }

    pub async fn process_batch(&self, items: Vec<Value>) -> Option<DispatchOutput> {
        if items.is_empty() {
            return Some(DispatchOutput::Single(McpResponse::error(
                None,
                McpError::InvalidRequest("Empty batch".to_string()),
            )));
        }

        let responses: Vec<McpResponse> = join_all(items.into_iter().map(|v| self.process_value(v)))
            .await
            .into_iter()
            .flatten()
            .collect();

        if responses.is_empty() {
            None
        } else {
            Some(DispatchOutput::Batch(responses))
        }
    }

    /// Validates one envelope and dispatches it.
    pub async fn process_value(&self, value: Value) -> Option<McpResponse> {
        let Value::Object(mut envelope) = value else {
            return Some(McpResponse::error(
                None,
                McpError::InvalidRequest("Request must be an object".to_string()),
            ));
        };

        let id = match envelope.get("id") {
            None => None,
            Some(raw) => match RequestId::from_value(raw) {
                Some(id) => Some(id),
                None => {
                    return Some(McpResponse::error(
                        None,
                        McpError::InvalidRequest("Invalid id".to_string()),
                    ))
                }
            },
        };

        if envelope.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Some(McpResponse::error(
                id,
                McpError::InvalidRequest("jsonrpc must be \"2.0\"".to_string()),
            ));
        }

        let method = match envelope.remove("method") {
            Some(Value::String(method)) => method,
            _ => {
                return Some(McpResponse::error(
                    id,
                    McpError::InvalidRequest("Missing method".to_string()),
                ))
            }
        };

        let request = McpRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method,
            params: envelope.remove("params"),
        };
        self.process_request(request).await
    }

    /// Runs a well-formed request. Notifications are executed but produce no
    /// response.
    pub async fn process_request(&self, request: McpRequest) -> Option<McpResponse> {
        let started = Instant::now();
        let method = McpMethod::from_name(&request.method);
        debug!("MCP {} (id {:?})", request.method, request.id);

        let outcome = match method {
            Some(method) => self.execute(method, request.params).await,
            None => Err(McpError::MethodNotFound(request.method.clone())),
        };

        metrics::record_rpc_request(
            method.map(|m| m.name()).unwrap_or("unknown"),
            outcome.is_ok(),
            started.elapsed(),
        );
        if let Err(e) = &outcome {
            warn!("MCP {} failed: {} ({})", request.method, e, e.code());
        }

        let id = request.id?;
        Some(match outcome {
            Ok(result) => McpResponse::success(id, result),
            Err(e) => McpResponse::error(Some(id), e),
        })
    }

    async fn execute(&self, method: McpMethod, params: Option<Value>) -> Result<Value, McpError> {
        match method {
            McpMethod::Initialize => self.system.initialize(params),
            McpMethod::Initialized => {
                debug!("Client finished initialization");
                Ok(json!({}))
            }
            McpMethod::Cancelled => {
                debug!("Client cancelled a request: {:?}", params);
                Ok(json!({}))
            }
            McpMethod::Ping => self.system.ping(),
            McpMethod::ToolsList => self.tools.list().await,
            McpMethod::ToolsCall => self.tools.call(params).await,
            McpMethod::PromptsList => self.prompts.list().await,
            McpMethod::PromptsGet => self.prompts.get(params).await,
            McpMethod::ResourcesList => self.resources.list().await,
            McpMethod::ResourcesRead => self.resources.read(params).await,
            McpMethod::ResourceTemplatesList => self.resources.list_templates().await,
        }
    }
}
