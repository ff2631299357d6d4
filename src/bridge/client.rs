//! One upstream MCP server and its lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::BridgeServerConfig;
use super::error::BridgeError;
use super::transport::BridgeTransport;
use super::{BridgeEvent, ChangeKind};
use crate::server::metrics;

/// Pages followed per catalog listing
pub const MAX_LIST_PAGES: usize = 10;

/// Lifecycle of a bridge client.
///
/// `Uninitialized → Probing → Initialized → Active`, with `Error` on
/// unrecoverable I/O failure and `Stopped` after teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Probing,
    Initialized,
    Active,
    Error(String),
    Stopped,
}

impl BridgeState {
    pub fn is_usable(&self) -> bool {
        matches!(self, BridgeState::Initialized | BridgeState::Active)
    }
}

pub struct BridgeClient {
    config: BridgeServerConfig,
    transport: Arc<dyn BridgeTransport>,
    state: RwLock<BridgeState>,
    sse_supported: AtomicBool,
    server_info: RwLock<Option<Value>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeClient {
    pub fn new(config: BridgeServerConfig, transport: Arc<dyn BridgeTransport>) -> Self {
        Self {
            config,
            transport,
            state: RwLock::new(BridgeState::Uninitialized),
            sse_supported: AtomicBool::new(false),
            server_info: RwLock::new(None),
            event_task: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &BridgeServerConfig {
        &self.config
    }

    pub fn state(&self) -> BridgeState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, state: BridgeState) {
        debug!("Bridge {} -> {:?}", self.config.name, state);
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn sse_supported(&self) -> bool {
        self.sse_supported.load(Ordering::Relaxed)
    }

    pub fn working_endpoint(&self) -> Option<String> {
        self.transport.endpoint()
    }

    /// `serverInfo` reported by the upstream during the handshake.
    pub fn server_info(&self) -> Option<Value> {
        self.server_info
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Probes, handshakes and opens the notification stream. Upstream change
    /// notifications are relayed on `events`.
    pub async fn start(
        &self,
        timeout: Duration,
        events: broadcast::Sender<BridgeEvent>,
    ) -> Result<(), BridgeError> {
        self.set_state(BridgeState::Probing);

        let init = match tokio::time::timeout(timeout, self.transport.connect()).await {
            Ok(Ok(init)) => init,
            Ok(Err(e)) => {
                self.set_state(BridgeState::Error(e.to_string()));
                return Err(e);
            }
            Err(_) => {
                let e = BridgeError::Timeout(timeout);
                self.set_state(BridgeState::Error(e.to_string()));
                return Err(e);
            }
        };
        *self.server_info.write().unwrap_or_else(|e| e.into_inner()) =
            init.get("serverInfo").cloned();
        self.set_state(BridgeState::Initialized);

        match tokio::time::timeout(timeout, self.transport.open_event_stream()).await {
            Ok(Ok(mut rx)) => {
                self.sse_supported.store(true, Ordering::Relaxed);
                let server = self.config.name.clone();
                let handle = tokio::spawn(async move {
                    while let Some(notification) = rx.recv().await {
                        match ChangeKind::from_method(&notification.method) {
                            Some(kind) => {
                                debug!("Bridge {} reported {:?} change", server, kind);
                                let _ = events.send(BridgeEvent::Changed {
                                    server: server.clone(),
                                    kind,
                                });
                            }
                            None => debug!(
                                "Bridge {} sent unhandled notification {}",
                                server, notification.method
                            ),
                        }
                    }
                });
                if let Some(previous) = self
                    .event_task
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .replace(handle)
                {
                    previous.abort();
                }
            }
            Ok(Err(e)) => {
                debug!("Bridge {} has no event stream: {}", self.config.name, e);
                self.sse_supported.store(false, Ordering::Relaxed);
            }
            Err(_) => {
                debug!("Bridge {} event stream timed out", self.config.name);
                self.sse_supported.store(false, Ordering::Relaxed);
            }
        }

        self.set_state(BridgeState::Active);
        info!(
            "Bridge {} active at {}",
            self.config.name,
            self.working_endpoint().unwrap_or_default()
        );
        Ok(())
    }

    /// One JSON-RPC call with its own timeout. A timeout aborts only this
    /// call and leaves the bridge active.
    pub async fn rpc_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        if !self.state().is_usable() {
            return Err(BridgeError::Closed);
        }

        match tokio::time::timeout(timeout, self.transport.send(method, params)).await {
            Ok(Ok(result)) => {
                metrics::record_bridge_call(&self.config.name, "ok");
                Ok(result)
            }
            Ok(Err(e)) => {
                if e.is_rpc() {
                    metrics::record_bridge_call(&self.config.name, "rejected");
                } else {
                    metrics::record_bridge_call(&self.config.name, "failed");
                }
                if matches!(e, BridgeError::Closed | BridgeError::Io(_)) {
                    warn!("Bridge {} failed: {}", self.config.name, e);
                    self.set_state(BridgeState::Error(e.to_string()));
                }
                Err(e)
            }
            Err(_) => {
                metrics::record_bridge_call(&self.config.name, "timeout");
                debug!(
                    "Bridge {}: {} timed out after {:?}",
                    self.config.name, method, timeout
                );
                Err(BridgeError::Timeout(timeout))
            }
        }
    }

    /// Collects every item of a paginated list method, following
    /// `nextCursor` for up to [`MAX_LIST_PAGES`] pages.
    pub async fn list_all(
        &self,
        method: &str,
        key: &str,
        timeout: Duration,
    ) -> Result<Vec<Value>, BridgeError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page = self.rpc_request(method, params, timeout).await?;
            if let Some(list) = page.get(key).and_then(Value::as_array) {
                items.extend(list.iter().cloned());
            }
            cursor = page
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(items);
            }
        }

        debug!(
            "Bridge {}: {} still paginating after {} pages",
            self.config.name, method, MAX_LIST_PAGES
        );
        Ok(items)
    }

    pub async fn close(&self) {
        if let Some(handle) = self
            .event_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
        self.transport.close().await;
        self.set_state(BridgeState::Stopped);
    }
}
