//! Notification sink registry.
//!
//! Tracks every client that can receive unsolicited notifications: WebSocket
//! connections, SSE listeners and the STDIO peer. Each client gets its own
//! bounded channel, and broadcasts never wait on a slow reader.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use super::protocol::McpNotification;
use crate::server::metrics;

/// Per-client outgoing buffer size
pub const CHANNEL_CAPACITY: usize = 64;

/// Which transport a sink belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    WebSocket,
    Sse,
    Stdio,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::WebSocket => "websocket",
            ConnectionKind::Sse => "sse",
            ConnectionKind::Stdio => "stdio",
        }
    }
}

struct ConnectionEntry {
    sender: mpsc::Sender<McpNotification>,
    kind: ConnectionKind,
}

/// Outcome of a broadcast, mostly for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    pub disconnected: usize,
}

/// Manages all connected notification sinks.
pub struct ConnectionManager {
    connections: RwLock<HashMap<String, ConnectionEntry>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new client.
    ///
    /// Returns the connection id and a receiver for outgoing notifications.
    /// The caller forwards messages from the receiver to its transport and
    /// calls [`unregister`](Self::unregister) on disconnect.
    pub async fn register(&self, kind: ConnectionKind) -> (String, mpsc::Receiver<McpNotification>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let id = Uuid::new_v4().to_string();

        let mut conns = self.connections.write().await;
        conns.insert(id.clone(), ConnectionEntry { sender: tx, kind });
        debug!("Registered {:?} connection {} ({} total)", kind, id, conns.len());
        publish_counts(&conns);

        (id, rx)
    }

    /// Unregister a client (called on disconnect).
    pub async fn unregister(&self, id: &str) {
        let mut conns = self.connections.write().await;
        if conns.remove(id).is_some() {
            debug!("Unregistered connection {} ({} left)", id, conns.len());
            publish_counts(&conns);
        }
    }

    /// Send a notification to every registered client.
    ///
    /// Uses `try_send`: a full channel drops the notification for that client
    /// only, a closed channel unregisters the client.
    pub async fn broadcast(&self, notification: McpNotification) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut closed = Vec::new();

        {
            let conns = self.connections.read().await;
            for (id, entry) in conns.iter() {
                match entry.sender.try_send(notification.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            "Dropping {} for slow {:?} client {}",
                            notification.method, entry.kind, id
                        );
                        report.dropped += 1;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        report.disconnected += 1;
                        closed.push(id.clone());
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut conns = self.connections.write().await;
            for id in &closed {
                conns.remove(id);
            }
            publish_counts(&conns);
        }

        debug!(
            "Broadcast {}: delivered={} dropped={} disconnected={}",
            notification.method, report.delivered, report.dropped, report.disconnected
        );
        report
    }

    pub async fn is_connected(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn total_connections(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn connection_count(&self, kind: ConnectionKind) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|entry| entry.kind == kind)
            .count()
    }
}

fn publish_counts(conns: &HashMap<String, ConnectionEntry>) {
    for kind in [ConnectionKind::WebSocket, ConnectionKind::Sse, ConnectionKind::Stdio] {
        let count = conns.values().filter(|entry| entry.kind == kind).count();
        metrics::set_connected_clients(kind.as_str(), count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(method: &str) -> McpNotification {
        McpNotification::new(method, json!({}))
    }

    #[tokio::test]
    async fn register_creates_valid_receiver() {
        let manager = ConnectionManager::new();
        let (_id, mut rx) = manager.register(ConnectionKind::WebSocket).await;

        manager.broadcast(notification("notifications/toolsChanged")).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.method, "notifications/toolsChanged");
    }

    #[tokio::test]
    async fn unregister_removes_connection() {
        let manager = ConnectionManager::new();
        let (id, _rx) = manager.register(ConnectionKind::Sse).await;

        assert!(manager.is_connected(&id).await);
        manager.unregister(&id).await;
        assert!(!manager.is_connected(&id).await);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_client() {
        let manager = ConnectionManager::new();
        let (_a, mut rx1) = manager.register(ConnectionKind::WebSocket).await;
        let (_b, mut rx2) = manager.register(ConnectionKind::Sse).await;

        let report = manager.broadcast(notification("n")).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(rx1.recv().await.unwrap().method, "n");
        assert_eq!(rx2.recv().await.unwrap().method, "n");
    }

    #[tokio::test]
    async fn broadcast_drops_closed_clients() {
        let manager = ConnectionManager::new();
        let (_a, _rx1) = manager.register(ConnectionKind::WebSocket).await;
        let (b, rx2) = manager.register(ConnectionKind::WebSocket).await;
        drop(rx2);

        let report = manager.broadcast(notification("n")).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.disconnected, 1);
        assert!(!manager.is_connected(&b).await);
        assert_eq!(manager.total_connections().await, 1);
    }

    #[tokio::test]
    async fn slow_client_does_not_block_others() {
        let manager = ConnectionManager::new();
        let (slow, _slow_rx) = manager.register(ConnectionKind::WebSocket).await;
        let (_fast, mut fast_rx) = manager.register(ConnectionKind::WebSocket).await;

        for _ in 0..CHANNEL_CAPACITY {
            manager.broadcast(notification("fill")).await;
            fast_rx.recv().await.unwrap();
        }

        let report = manager.broadcast(notification("overflow")).await;

        assert_eq!(report.dropped, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(fast_rx.recv().await.unwrap().method, "overflow");
        // Full is not closed: the slow client stays registered
        assert!(manager.is_connected(&slow).await);
    }

    #[tokio::test]
    async fn connection_count_by_kind() {
        let manager = ConnectionManager::new();
        let (_a, _rx1) = manager.register(ConnectionKind::WebSocket).await;
        let (_b, _rx2) = manager.register(ConnectionKind::Sse).await;
        let (_c, _rx3) = manager.register(ConnectionKind::Sse).await;

        assert_eq!(manager.connection_count(ConnectionKind::Sse).await, 2);
        assert_eq!(manager.connection_count(ConnectionKind::Stdio).await, 0);
    }
}
