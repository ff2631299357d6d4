//! The engine ties the catalog, the processors, the notification registry and
//! the optional bridge manager together. Transports only ever talk to an
//! [`McpEngine`].

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::catalog::{CatalogSnapshot, CatalogStore};
use super::connections::ConnectionManager;
use super::dispatcher::{DispatchOutput, Dispatcher};
use super::processors::system::ComponentCounts;
use super::processors::{PromptProcessor, ResourceProcessor, SystemProcessor, ToolProcessor};
use super::protocol::ServerInfo;
use super::registry::{PromptDefinition, ResourceDefinition};
use super::routes::RouteDefinition;
use crate::bridge::{BridgeEvent, BridgeManager};

pub struct McpEngine {
    catalog: Arc<CatalogStore>,
    connections: Arc<ConnectionManager>,
    system: Arc<SystemProcessor>,
    dispatcher: Dispatcher,
    bridges: Option<Arc<BridgeManager>>,
    relay: Mutex<Option<JoinHandle<()>>>,
}

impl McpEngine {
    /// Builds an engine. With a bridge manager, a relay task is spawned that
    /// turns bridge events into client notifications, so this must run
    /// inside a tokio runtime.
    pub fn new(server_info: ServerInfo, bridges: Option<Arc<BridgeManager>>) -> Self {
        let catalog = Arc::new(CatalogStore::new());
        let connections = Arc::new(ConnectionManager::new());
        let system = Arc::new(SystemProcessor::new(connections.clone(), server_info));
        let dispatcher = Dispatcher::new(
            ToolProcessor::new(catalog.clone(), bridges.clone()),
            PromptProcessor::new(catalog.clone(), bridges.clone()),
            ResourceProcessor::new(catalog.clone(), bridges.clone()),
            system.clone(),
        );

        let relay = bridges
            .as_ref()
            .map(|manager| spawn_bridge_relay(manager, system.clone(), catalog.clone()));

        Self {
            catalog,
            connections,
            system,
            dispatcher,
            bridges,
            relay: Mutex::new(relay),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn system(&self) -> &Arc<SystemProcessor> {
        &self.system
    }

    pub fn bridges(&self) -> Option<&Arc<BridgeManager>> {
        self.bridges.as_ref()
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.catalog.snapshot()
    }

    pub async fn process_text(&self, text: &str) -> Option<DispatchOutput> {
        self.dispatcher.process_text(text).await
    }

    pub async fn process_bytes(&self, bytes: &[u8]) -> Option<DispatchOutput> {
        self.dispatcher.process_bytes(bytes).await
    }

    /// Replaces the local routes. Clients get `toolsChanged` followed by one
    /// `mcpComponentsRefreshed`.
    pub async fn set_routes(&self, routes: Vec<RouteDefinition>) {
        let snapshot = self.catalog.replace(Some(routes), None, None);
        self.system.tools_changed().await;
        self.system.components_refreshed(counts(&snapshot)).await;
    }

    pub async fn set_prompts(&self, prompts: Vec<PromptDefinition>) {
        let snapshot = self.catalog.replace(None, Some(prompts), None);
        self.system.prompts_changed().await;
        self.system.components_refreshed(counts(&snapshot)).await;
    }

    pub async fn set_resources(&self, resources: Vec<ResourceDefinition>) {
        let snapshot = self.catalog.replace(None, None, Some(resources));
        self.system.resources_changed().await;
        self.system.components_refreshed(counts(&snapshot)).await;
    }

    /// Replaces all three local sources at once and announces it with a
    /// single `mcpComponentsRefreshed`.
    pub async fn reload_components(
        &self,
        routes: Vec<RouteDefinition>,
        prompts: Vec<PromptDefinition>,
        resources: Vec<ResourceDefinition>,
    ) {
        let snapshot = self
            .catalog
            .replace(Some(routes), Some(prompts), Some(resources));
        self.system.components_refreshed(counts(&snapshot)).await;
    }

    /// Stops the relay and closes every bridge.
    pub async fn shutdown(&self) {
        if let Some(handle) = self
            .relay
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
        if let Some(bridges) = &self.bridges {
            bridges.shutdown().await;
        }
        info!("MCP engine stopped");
    }
}

impl Drop for McpEngine {
    fn drop(&mut self) {
        if let Some(handle) = self
            .relay
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

fn counts(snapshot: &CatalogSnapshot) -> ComponentCounts {
    ComponentCounts {
        tools: snapshot.tools().len(),
        prompts: snapshot.prompts().len(),
        resources: snapshot.resources().len(),
    }
}

fn spawn_bridge_relay(
    manager: &Arc<BridgeManager>,
    system: Arc<SystemProcessor>,
    catalog: Arc<CatalogStore>,
) -> JoinHandle<()> {
    let mut events = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(BridgeEvent::Changed { server, kind }) => {
                    system.bridge_changed(&server, kind).await;
                }
                Ok(BridgeEvent::Reloaded { active }) => {
                    debug!("Bridge set reloaded, {} active", active.len());
                    system
                        .components_refreshed(counts(&catalog.snapshot()))
                        .await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Bridge relay skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
