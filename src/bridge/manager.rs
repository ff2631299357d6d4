//! Owner of all bridge clients.
//!
//! The active clients live in an immutable [`BridgeSet`] that is swapped as a
//! whole on reload. Every operation clones the current set once, so a reload
//! racing with an in-flight catalog build never mixes old and new clients.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::client::{BridgeClient, BridgeState};
use super::config::{load_bridge_config, BridgeServerConfig};
use super::error::BridgeError;
use super::resolve::{resolve_tool_call, Candidate, Resolution, ToolRoute};
use super::transport::TransportFactory;
use super::BridgeEvent;
use crate::mcp::protocol::methods;
use crate::mcp::registry::Tool;
use crate::mcp::schema::{normalize_input_schema, normalize_schema};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Immutable set of bridge clients, keyed and ordered by config name.
#[derive(Default)]
pub struct BridgeSet {
    clients: BTreeMap<String, Arc<BridgeClient>>,
}

impl BridgeSet {
    pub fn get(&self, name: &str) -> Option<&Arc<BridgeClient>> {
        self.clients.get(name)
    }

    pub fn active(&self) -> Vec<Arc<BridgeClient>> {
        self.clients
            .values()
            .filter(|c| c.state().is_usable())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// What a reload changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReloadSummary {
    pub kept: Vec<String>,
    pub started: Vec<String>,
    pub failed: Vec<String>,
    pub removed: Vec<String>,
}

/// Health view of one bridge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub name: String,
    pub state: String,
    pub working_endpoint: Option<String>,
    pub sse_supported: bool,
}

/// Lookup tables from the last aggregated listings.
#[derive(Default)]
struct CatalogIndex {
    tools: HashMap<String, ToolRoute>,
    advertised_tools: HashMap<String, HashSet<String>>,
    prompts: HashMap<String, String>,
    resources: HashMap<String, String>,
}

pub struct BridgeManager {
    factory: Arc<dyn TransportFactory>,
    bridges: RwLock<Arc<BridgeSet>>,
    index: RwLock<CatalogIndex>,
    events: broadcast::Sender<BridgeEvent>,
    timeout: Duration,
    config_path: Option<PathBuf>,
    reload_lock: tokio::sync::Mutex<()>,
}

impl BridgeManager {
    pub fn new(factory: Arc<dyn TransportFactory>, timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            factory,
            bridges: RwLock::new(Arc::new(BridgeSet::default())),
            index: RwLock::new(CatalogIndex::default()),
            events,
            timeout,
            config_path: None,
            reload_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// The current bridge set. Hold it for the length of one operation.
    pub fn snapshot(&self) -> Arc<BridgeSet> {
        self.bridges.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn bridge(&self, name: &str) -> Option<Arc<BridgeClient>> {
        self.snapshot().get(name).cloned()
    }

    pub fn statuses(&self) -> Vec<BridgeStatus> {
        self.snapshot()
            .clients
            .values()
            .map(|client| BridgeStatus {
                name: client.name().to_string(),
                state: match client.state() {
                    BridgeState::Error(e) => format!("error: {}", e),
                    other => format!("{:?}", other).to_lowercase(),
                },
                working_endpoint: client.working_endpoint(),
                sse_supported: client.sse_supported(),
            })
            .collect()
    }

    /// Reads the configured bridge file and applies it. A file that cannot
    /// be read or parsed leaves the current bridges untouched.
    pub async fn reload_from_file(&self) -> Result<ReloadSummary, BridgeError> {
        let Some(path) = self.config_path.clone() else {
            return Err(BridgeError::Config("No bridge config path".to_string()));
        };
        match load_bridge_config(&path) {
            Ok(configs) => Ok(self.apply_config(configs).await),
            Err(e) => {
                warn!("Keeping current bridges, {:?} is invalid: {}", path, e);
                Err(e)
            }
        }
    }

    /// Builds a new bridge set from `configs` and swaps it in.
    ///
    /// Unchanged, healthy clients are kept as they are. New and changed
    /// entries are started concurrently. Replaced and removed clients are
    /// closed after the swap.
    pub async fn apply_config(&self, configs: Vec<BridgeServerConfig>) -> ReloadSummary {
        let _guard = self.reload_lock.lock().await;
        let current = self.snapshot();
        let mut summary = ReloadSummary::default();
        let mut next: BTreeMap<String, Arc<BridgeClient>> = BTreeMap::new();
        let mut to_start = Vec::new();

        for config in configs {
            match current.get(&config.name) {
                Some(existing) if existing.config() == &config && existing.state().is_usable() => {
                    summary.kept.push(config.name.clone());
                    next.insert(config.name.clone(), existing.clone());
                }
                _ => match self.factory.create(&config) {
                    Ok(transport) => {
                        let client = Arc::new(BridgeClient::new(config.clone(), transport));
                        next.insert(config.name.clone(), client.clone());
                        to_start.push(client);
                    }
                    Err(e) => {
                        warn!("Bridge {} cannot be created: {}", config.name, e);
                        summary.failed.push(config.name.clone());
                    }
                },
            }
        }

        let results = join_all(
            to_start
                .iter()
                .map(|client| client.start(self.timeout, self.events.clone())),
        )
        .await;
        for (client, result) in to_start.iter().zip(results) {
            match result {
                Ok(()) => summary.started.push(client.name().to_string()),
                Err(e) => {
                    warn!("Bridge {} failed to start: {}", client.name(), e);
                    summary.failed.push(client.name().to_string());
                }
            }
        }

        let next = Arc::new(BridgeSet { clients: next });
        *self.bridges.write().unwrap_or_else(|e| e.into_inner()) = next.clone();

        let retired: Vec<Arc<BridgeClient>> = current
            .clients
            .iter()
            .filter(|(name, client)| {
                next.get(name)
                    .map(|kept| !Arc::ptr_eq(kept, client))
                    .unwrap_or(true)
            })
            .map(|(_, client)| client.clone())
            .collect();
        for client in &retired {
            if !next.clients.contains_key(client.name()) {
                summary.removed.push(client.name().to_string());
            }
        }
        join_all(retired.iter().map(|client| client.close())).await;

        let active: Vec<String> = next.active().iter().map(|c| c.name().to_string()).collect();
        info!(
            "Bridges reloaded: {} active (kept {:?}, started {:?}, failed {:?}, removed {:?})",
            active.len(),
            summary.kept,
            summary.started,
            summary.failed,
            summary.removed
        );
        let _ = self.events.send(BridgeEvent::Reloaded { active });
        summary
    }

    /// Closes every bridge.
    pub async fn shutdown(&self) {
        let current = {
            let mut guard = self.bridges.write().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        join_all(current.clients.values().map(|client| client.close())).await;
        debug!("Closed {} bridges", current.len());
    }

    // ------------------------------------------------------------------
    // Catalog fan-out
    // ------------------------------------------------------------------

    /// Calls `method` on every active bridge concurrently. Failing and
    /// timed-out bridges are logged and left out.
    async fn fan_out(&self, method: &str, key: &str) -> Vec<(String, Vec<Value>)> {
        let active = self.snapshot().active();
        let results = join_all(
            active
                .iter()
                .map(|client| client.list_all(method, key, self.timeout)),
        )
        .await;

        active
            .iter()
            .zip(results)
            .filter_map(|(client, result)| match result {
                Ok(items) => Some((client.name().to_string(), items)),
                Err(e) => {
                    warn!("Bridge {}: {} failed: {}", client.name(), method, e);
                    None
                }
            })
            .collect()
    }

    /// Aggregated bridge tools. Names in `reserved` (local tools) and names
    /// taken by an earlier bridge are exposed as `<server>_<name>`.
    pub async fn list_tools(&self, reserved: &HashSet<String>) -> Vec<Tool> {
        let per_bridge = self.fan_out(methods::TOOLS_LIST, "tools").await;

        let mut tools = Vec::new();
        let mut taken: HashSet<String> = reserved.clone();
        let mut index = HashMap::new();
        let mut advertised = HashMap::new();

        for (server, items) in per_bridge {
            let mut names = HashSet::new();
            for item in items {
                let Some(original) = item.get("name").and_then(Value::as_str) else {
                    continue;
                };
                names.insert(original.to_string());

                let exposed = if taken.contains(original) {
                    let prefixed = format!("{}_{}", server, original);
                    if taken.contains(&prefixed) {
                        debug!("Bridge {}: dropping duplicate tool {}", server, original);
                        continue;
                    }
                    prefixed
                } else {
                    original.to_string()
                };
                taken.insert(exposed.clone());
                index.insert(
                    exposed.clone(),
                    ToolRoute {
                        server: server.clone(),
                        original_name: original.to_string(),
                    },
                );

                tools.push(Tool {
                    name: exposed,
                    description: item
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    method: None,
                    path: None,
                    input_schema: normalize_input_schema(
                        item.get("inputSchema").unwrap_or(&Value::Null),
                    ),
                    response_schema: item.get("outputSchema").map(normalize_schema),
                    tags: Vec::new(),
                    bridge_tool_name: Some(original.to_string()),
                    bridge_server_name: Some(server.clone()),
                });
            }
            advertised.insert(server, names);
        }

        let mut guard = self.index.write().unwrap_or_else(|e| e.into_inner());
        guard.tools = index;
        guard.advertised_tools = advertised;
        tools
    }

    /// Forwards a tool call. `Ok(None)` means no bridge has the tool.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<Option<Value>, BridgeError> {
        let active = self.snapshot().active();
        let (hint, advertised) = {
            let index = self.index.read().unwrap_or_else(|e| e.into_inner());
            (index.tools.get(name).cloned(), index.advertised_tools.clone())
        };

        let candidates: Vec<Candidate<'_>> = active
            .iter()
            .map(|client| Candidate {
                client,
                advertised: advertised.get(client.name()),
            })
            .collect();

        match resolve_tool_call(&candidates, hint.as_ref(), name, &arguments, self.timeout).await {
            Resolution::Called {
                server,
                tool,
                result,
            } => {
                info!("Tool {} served by bridge {} as {}", name, server, tool);
                Ok(Some(result))
            }
            Resolution::Rejected(e) => Err(e),
            Resolution::NotFound => Ok(None),
        }
    }

    /// Aggregated bridge prompts, first bridge wins on duplicate names.
    pub async fn list_prompts(&self, reserved: &HashSet<String>) -> Vec<Value> {
        let per_bridge = self.fan_out(methods::PROMPTS_LIST, "prompts").await;
        let (items, index) = merge_unique(per_bridge, "name", reserved);
        self.index.write().unwrap_or_else(|e| e.into_inner()).prompts = index;
        items
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<Option<Value>, BridgeError> {
        let owner = self
            .index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .prompts
            .get(name)
            .cloned();
        let mut params = json!({ "name": name });
        if let Some(arguments) = arguments {
            params["arguments"] = arguments;
        }
        self.first_success(owner.as_deref(), methods::PROMPTS_GET, params)
            .await
    }

    pub async fn list_resources(&self, reserved: &HashSet<String>) -> Vec<Value> {
        let per_bridge = self.fan_out(methods::RESOURCES_LIST, "resources").await;
        let (items, index) = merge_unique(per_bridge, "uri", reserved);
        self.index.write().unwrap_or_else(|e| e.into_inner()).resources = index;
        items
    }

    pub async fn list_resource_templates(&self, reserved: &HashSet<String>) -> Vec<Value> {
        let per_bridge = self
            .fan_out(methods::RESOURCES_TEMPLATES_LIST, "resourceTemplates")
            .await;
        merge_unique(per_bridge, "uriTemplate", reserved).0
    }

    /// Reads a resource from the bridge that advertised it, then from any
    /// bridge that can serve it.
    pub async fn read_resource(&self, uri: &str) -> Result<Option<Value>, BridgeError> {
        let owner = self
            .index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .resources
            .get(uri)
            .cloned();
        self.first_success(owner.as_deref(), methods::RESOURCES_READ, json!({ "uri": uri }))
            .await
    }

    /// Tries `preferred` first, then every other active bridge. An RPC error
    /// from the preferred bridge is returned if nobody else answers.
    async fn first_success(
        &self,
        preferred: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Option<Value>, BridgeError> {
        let mut active = self.snapshot().active();
        if let Some(preferred) = preferred {
            active.sort_by_key(|c| c.name() != preferred);
        }

        let mut rejected = None;
        for client in &active {
            match client
                .rpc_request(method, Some(params.clone()), self.timeout)
                .await
            {
                Ok(result) => return Ok(Some(result)),
                Err(e) => {
                    debug!("Bridge {}: {} failed: {}", client.name(), method, e);
                    if e.is_rpc() && Some(client.name()) == preferred {
                        rejected = Some(e);
                    }
                }
            }
        }
        match rejected {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// Concatenates per-bridge listings, dropping items whose `key` was already
/// seen (locally or on an earlier bridge). Returns the items and an index of
/// key → server.
fn merge_unique(
    per_bridge: Vec<(String, Vec<Value>)>,
    key: &str,
    reserved: &HashSet<String>,
) -> (Vec<Value>, HashMap<String, String>) {
    let mut items = Vec::new();
    let mut index: HashMap<String, String> = HashMap::new();
    for (server, list) in per_bridge {
        for item in list {
            let Some(id) = item.get(key).and_then(Value::as_str) else {
                continue;
            };
            if reserved.contains(id) || index.contains_key(id) {
                continue;
            }
            index.insert(id.to_string(), server.clone());
            items.push(item);
        }
    }
    (items, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::mock::{MockFactory, MockTransport};

    fn manager(factory: Arc<MockFactory>) -> BridgeManager {
        BridgeManager::new(factory, Duration::from_millis(200))
    }

    fn configs(names: &[&str]) -> Vec<BridgeServerConfig> {
        names
            .iter()
            .map(|n| BridgeServerConfig::http(*n, format!("http://{}.example", n)))
            .collect()
    }

    #[tokio::test]
    async fn test_apply_config_starts_and_reports() {
        let factory = Arc::new(MockFactory::default());
        factory.insert("alpha", MockTransport::with_tools(&["click"]));
        factory.insert("broken", MockTransport::failing());
        let manager = manager(factory);
        let mut events = manager.subscribe();

        let summary = manager.apply_config(configs(&["alpha", "broken"])).await;

        assert_eq!(summary.started, vec!["alpha"]);
        assert_eq!(summary.failed, vec!["broken"]);
        assert_eq!(manager.snapshot().active().len(), 1);
        assert_eq!(
            events.recv().await.unwrap(),
            BridgeEvent::Reloaded {
                active: vec!["alpha".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_reload_keeps_unchanged_and_closes_removed() {
        let factory = Arc::new(MockFactory::default());
        let alpha = factory.insert("alpha", MockTransport::with_tools(&["a"]));
        let beta = factory.insert("beta", MockTransport::with_tools(&["b"]));
        let manager = manager(factory);

        manager.apply_config(configs(&["alpha", "beta"])).await;
        let alpha_client = manager.bridge("alpha").unwrap();

        let summary = manager.apply_config(configs(&["alpha"])).await;

        assert_eq!(summary.kept, vec!["alpha"]);
        assert_eq!(summary.removed, vec!["beta"]);
        assert!(Arc::ptr_eq(&alpha_client, &manager.bridge("alpha").unwrap()));
        assert!(beta.is_closed());
        assert!(!alpha.is_closed());
    }

    #[tokio::test]
    async fn test_reload_from_bad_file_keeps_current_bridges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp-bridge.json");
        std::fs::write(
            &path,
            r#"{"mcpServers": {"alpha": {"url": "http://alpha.example"}}}"#,
        )
        .unwrap();

        let factory = Arc::new(MockFactory::default());
        let alpha = factory.insert("alpha", MockTransport::with_tools(&["click"]));
        let manager = manager(factory).with_config_path(&path);
        manager.reload_from_file().await.unwrap();
        assert_eq!(manager.snapshot().active().len(), 1);

        for contents in ["", "   \n", "{ not json"] {
            std::fs::write(&path, contents).unwrap();
            assert!(matches!(
                manager.reload_from_file().await,
                Err(BridgeError::Config(_))
            ));
            assert_eq!(manager.snapshot().active().len(), 1);
            assert!(!alpha.is_closed());
        }
    }

    #[tokio::test]
    async fn test_list_tools_tolerates_stalled_bridge() {
        let factory = Arc::new(MockFactory::default());
        factory.insert("alpha", MockTransport::with_tools(&["click"]));
        factory.insert(
            "slow",
            MockTransport::with_tools(&["never"]).stall("tools/list"),
        );
        let manager = manager(factory);
        manager.apply_config(configs(&["alpha", "slow"])).await;

        let tools = manager.list_tools(&HashSet::new()).await;

        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["click"]);
        assert_eq!(tools[0].bridge_server_name.as_deref(), Some("alpha"));
        assert!(manager.bridge("slow").unwrap().state().is_usable());
    }

    #[tokio::test]
    async fn test_list_tools_renames_collisions() {
        let factory = Arc::new(MockFactory::default());
        factory.insert("alpha", MockTransport::with_tools(&["search", "click"]));
        factory.insert("beta", MockTransport::with_tools(&["click"]));
        let manager = manager(factory);
        manager.apply_config(configs(&["alpha", "beta"])).await;

        let reserved: HashSet<String> = ["search".to_string()].into_iter().collect();
        let tools = manager.list_tools(&reserved).await;

        let mut names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["alpha_search", "beta_click", "click"]);
        let renamed = tools.iter().find(|t| t.name == "beta_click").unwrap();
        assert_eq!(renamed.bridge_tool_name.as_deref(), Some("click"));
    }

    #[tokio::test]
    async fn test_call_tool_uses_recorded_original_name() {
        let factory = Arc::new(MockFactory::default());
        factory.insert("alpha", MockTransport::with_tools(&["click"]));
        let beta = factory.insert("beta", MockTransport::with_tools(&["click"]));
        let manager = manager(factory);
        manager.apply_config(configs(&["alpha", "beta"])).await;
        manager.list_tools(&HashSet::new()).await;

        let result = manager
            .call_tool("beta_click", json!({"x": 1}))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result["content"][0]["text"], "called click");
        assert_eq!(
            beta.recorded("tools/call"),
            vec![Some(json!({"name": "click", "arguments": {"x": 1}}))]
        );
    }

    #[tokio::test]
    async fn test_call_unknown_tool_is_none() {
        let factory = Arc::new(MockFactory::default());
        factory.insert("alpha", MockTransport::with_tools(&["click"]));
        let manager = manager(factory);
        manager.apply_config(configs(&["alpha"])).await;

        assert!(manager.call_tool("nope", json!({})).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_call_tool_relays_argument_rejection_with_or_without_listing() {
        let factory = Arc::new(MockFactory::default());
        factory.insert(
            "alpha",
            MockTransport::with_tools(&["click"]).reject("click", "click: missing required argument x"),
        );
        let manager = manager(factory);
        manager.apply_config(configs(&["alpha"])).await;

        for listed in [false, true] {
            if listed {
                manager.list_tools(&HashSet::new()).await;
            }
            match manager.call_tool("click", json!({})).await {
                Err(BridgeError::Rpc { code, message }) => {
                    assert_eq!(code, -32602);
                    assert_eq!(message, "click: missing required argument x");
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_prompts_and_resources_route_to_owner() {
        let factory = Arc::new(MockFactory::default());
        factory.insert(
            "alpha",
            MockTransport::default()
                .with_prompts(vec![json!({"name": "summarize"})])
                .with_resources(vec![json!({"uri": "docs://a", "name": "A"})]),
        );
        let manager = manager(factory);
        manager.apply_config(configs(&["alpha"])).await;

        assert_eq!(manager.list_prompts(&HashSet::new()).await.len(), 1);
        assert_eq!(manager.list_resources(&HashSet::new()).await.len(), 1);

        let prompt = manager.get_prompt("summarize", None).await.unwrap().unwrap();
        assert_eq!(prompt["messages"][0]["content"]["text"], "summarize");
        let resource = manager.read_resource("docs://a").await.unwrap().unwrap();
        assert_eq!(resource["contents"][0]["text"], "remote");

        // Unlisted uris are asked of every bridge; a plain rejection is a miss
        let missing = manager.read_resource("docs://missing").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let factory = Arc::new(MockFactory::default());
        let alpha = factory.insert("alpha", MockTransport::default());
        let manager = manager(factory);
        manager.apply_config(configs(&["alpha"])).await;

        manager.shutdown().await;

        assert!(alpha.is_closed());
        assert!(manager.snapshot().is_empty());
    }
}
