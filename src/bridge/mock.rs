//! In-memory transport for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::config::BridgeServerConfig;
use super::error::BridgeError;
use super::transport::{BridgeTransport, EventReceiver, TransportFactory};
use crate::mcp::protocol::{error_codes, McpRequest};

#[derive(Default)]
pub struct MockTransport {
    pub tools: Vec<Value>,
    pub prompts: Vec<Value>,
    pub resources: Vec<Value>,
    /// Methods that never answer
    pub stalled: Vec<String>,
    pub fail_connect: bool,
    /// Tool name and message of calls rejected with invalid params
    pub rejections: Vec<(String, String)>,
    pub calls: Mutex<Vec<(String, Option<Value>)>>,
    pub closed: Mutex<bool>,
    events: Mutex<Option<mpsc::Sender<McpRequest>>>,
}

impl MockTransport {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names
                .iter()
                .map(|n| json!({"name": n, "description": format!("{} tool", n), "inputSchema": {"type": "object"}}))
                .collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    pub fn with_prompts(mut self, prompts: Vec<Value>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_resources(mut self, resources: Vec<Value>) -> Self {
        self.resources = resources;
        self
    }

    pub fn reject(mut self, tool: &str, message: &str) -> Self {
        self.rejections.push((tool.to_string(), message.to_string()));
        self
    }

    pub fn stall(mut self, method: &str) -> Self {
        self.stalled.push(method.to_string());
        self
    }

    pub fn recorded(&self, method: &str) -> Vec<Option<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    pub async fn push_notification(&self, method: &str) {
        let sender = self.events.lock().unwrap().clone();
        if let Some(sender) = sender {
            let _ = sender.send(McpRequest::notification(method, None)).await;
        }
    }

    fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t["name"] == name)
    }
}

#[async_trait]
impl BridgeTransport for MockTransport {
    async fn connect(&self) -> Result<Value, BridgeError> {
        if self.fail_connect {
            return Err(BridgeError::NotMcpServer("mock://".to_string()));
        }
        Ok(json!({"serverInfo": {"name": "mock", "version": "1"}}))
    }

    async fn send(&self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        if self.stalled.iter().any(|m| m == method) {
            futures::future::pending::<()>().await;
        }
        match method {
            "tools/list" => Ok(json!({"tools": self.tools})),
            "prompts/list" => Ok(json!({"prompts": self.prompts})),
            "resources/list" => Ok(json!({"resources": self.resources})),
            "resources/templates/list" => Ok(json!({"resourceTemplates": []})),
            "tools/call" => {
                let name = params
                    .as_ref()
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if let Some((_, message)) = self.rejections.iter().find(|(t, _)| *t == name) {
                    Err(BridgeError::Rpc {
                        code: error_codes::INVALID_PARAMS,
                        message: message.clone(),
                    })
                } else if self.has_tool(&name) {
                    Ok(json!({"content": [{"type": "text", "text": format!("called {}", name)}]}))
                } else {
                    Err(BridgeError::Rpc {
                        code: error_codes::INVALID_PARAMS,
                        message: format!("Unknown tool: {}", name),
                    })
                }
            }
            "prompts/get" => {
                let name = params
                    .as_ref()
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if self.prompts.iter().any(|p| p["name"] == name) {
                    Ok(json!({"messages": [{"role": "user", "content": {"type": "text", "text": name}}]}))
                } else {
                    Err(BridgeError::Rpc {
                        code: error_codes::INVALID_PARAMS,
                        message: "Unknown prompt".to_string(),
                    })
                }
            }
            "resources/read" => {
                let uri = params
                    .as_ref()
                    .and_then(|p| p.get("uri"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if self.resources.iter().any(|r| r["uri"] == uri) {
                    Ok(json!({"contents": [{"uri": uri, "text": "remote"}]}))
                } else {
                    Err(BridgeError::Rpc {
                        code: error_codes::INVALID_PARAMS,
                        message: "Unknown resource".to_string(),
                    })
                }
            }
            _ => Err(BridgeError::Rpc {
                code: error_codes::METHOD_NOT_FOUND,
                message: "Method not found".to_string(),
            }),
        }
    }

    async fn notify(&self, _notification: McpRequest) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn open_event_stream(&self) -> Result<EventReceiver, BridgeError> {
        let (tx, rx) = mpsc::channel(16);
        *self.events.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn close(&self) {
        *self.closed.lock().unwrap() = true;
        self.events.lock().unwrap().take();
    }

    fn endpoint(&self) -> Option<String> {
        Some("mock://".to_string())
    }
}

/// Hands out pre-built mock transports by bridge name.
#[derive(Default)]
pub struct MockFactory {
    pub transports: Mutex<HashMap<String, Arc<MockTransport>>>,
}

impl MockFactory {
    pub fn insert(&self, name: &str, transport: MockTransport) -> Arc<MockTransport> {
        let transport = Arc::new(transport);
        self.transports
            .lock()
            .unwrap()
            .insert(name.to_string(), transport.clone());
        transport
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, config: &BridgeServerConfig) -> Result<Arc<dyn BridgeTransport>, BridgeError> {
        self.transports
            .lock()
            .unwrap()
            .get(&config.name)
            .cloned()
            .map(|t| t as Arc<dyn BridgeTransport>)
            .ok_or_else(|| BridgeError::Config(format!("No mock for {}", config.name)))
    }
}
