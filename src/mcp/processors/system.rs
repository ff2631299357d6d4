//! Lifecycle methods and outgoing notifications.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::to_result;
use crate::bridge::ChangeKind;
use crate::mcp::connections::{BroadcastReport, ConnectionManager};
use crate::mcp::protocol::{
    negotiate_protocol_version, notifications, InitializeParams, InitializeResult,
    ListChangedCapability, McpError, McpNotification, PingResult, ResourcesCapability,
    ServerCapabilities, ServerInfo,
};
use crate::server::metrics;

/// Counts reported with `notifications/mcpComponentsRefreshed`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentCounts {
    pub tools: usize,
    pub prompts: usize,
    pub resources: usize,
}

pub struct SystemProcessor {
    connections: Arc<ConnectionManager>,
    server_info: ServerInfo,
}

impl SystemProcessor {
    pub fn new(connections: Arc<ConnectionManager>, server_info: ServerInfo) -> Self {
        Self {
            connections,
            server_info,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn initialize(&self, params: Option<Value>) -> Result<Value, McpError> {
        let params: InitializeParams = match params {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| McpError::InvalidParams(e.to_string()))?,
            None => InitializeParams::default(),
        };
        if let Some(client) = &params.client_info {
            info!("MCP client {} {} initializing", client.name, client.version);
        }

        to_result(InitializeResult {
            protocol_version: negotiate_protocol_version(params.protocol_version.as_deref())
                .to_string(),
            capabilities: ServerCapabilities {
                tools: ListChangedCapability { list_changed: true },
                prompts: ListChangedCapability { list_changed: true },
                resources: ResourcesCapability {
                    subscribe: false,
                    list_changed: true,
                },
            },
            server_info: self.server_info.clone(),
        })
    }

    pub fn ping(&self) -> Result<Value, McpError> {
        to_result(PingResult::default())
    }

    /// Sends `method` to every connected client. `extra` fields are merged
    /// next to the timestamp.
    pub async fn broadcast(&self, method: &str, extra: Value) -> BroadcastReport {
        let mut params = json!({ "timestamp": Utc::now().to_rfc3339() });
        if let (Value::Object(target), Value::Object(extra)) = (&mut params, extra) {
            target.extend(extra);
        }

        let report = self
            .connections
            .broadcast(McpNotification::new(method, params))
            .await;
        metrics::record_notifications(method, report.delivered, report.dropped);
        report
    }

    pub async fn tools_changed(&self) -> BroadcastReport {
        self.broadcast(notifications::TOOLS_CHANGED, json!({})).await
    }

    pub async fn prompts_changed(&self) -> BroadcastReport {
        self.broadcast(notifications::PROMPTS_CHANGED, json!({})).await
    }

    pub async fn resources_changed(&self) -> BroadcastReport {
        self.broadcast(notifications::RESOURCES_CHANGED, json!({}))
            .await
    }

    pub async fn components_refreshed(&self, counts: ComponentCounts) -> BroadcastReport {
        self.broadcast(
            notifications::COMPONENTS_REFRESHED,
            json!({
                "tools": counts.tools,
                "prompts": counts.prompts,
                "resources": counts.resources,
            }),
        )
        .await
    }

    /// Re-broadcasts a change announced by an upstream bridge.
    pub async fn bridge_changed(&self, server: &str, kind: ChangeKind) -> BroadcastReport {
        let method = match kind {
            ChangeKind::Tools => notifications::TOOLS_CHANGED,
            ChangeKind::Prompts => notifications::PROMPTS_CHANGED,
            ChangeKind::Resources => notifications::RESOURCES_CHANGED,
            ChangeKind::All => notifications::COMPONENTS_REFRESHED,
        };
        debug!("Relaying {:?} change from bridge {}", kind, server);
        self.broadcast(method, json!({ "source": "bridge", "server": server }))
            .await
    }
}
