//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test gateways.
//! Each test gets an isolated gateway with its own engine, fixture catalog
//! and, for bridging tests, its own bridge file in a temp directory.

#![allow(dead_code)]

use super::constants::*;
use super::fixtures::{test_prompts, test_resources, test_routes};
use mcp_gateway::bridge::ConfigWatcher;
use mcp_gateway::mcp::protocol::ServerInfo;
use mcp_gateway::server::{make_app, RequestsLoggingLevel, ServerConfig};
use mcp_gateway::{BridgeManager, DefaultTransportFactory, McpEngine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test gateway instance
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Engine behind the server, for swapping the catalog from tests
    pub engine: Arc<McpEngine>,

    /// Bridge manager, present for gateways spawned with bridges
    pub bridges: Option<Arc<BridgeManager>>,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    _watcher: Option<ConfigWatcher>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a gateway serving the fixture catalog, without bridges.
    pub async fn spawn() -> Self {
        Self::spawn_named("local", None).await
    }

    /// Spawns a gateway that serves the fixture catalog and bridges the
    /// servers listed in `bridge_config` (an `mcpServers` JSON document).
    /// The bridge file is watched for changes.
    pub async fn spawn_with_bridges(bridge_config: &str) -> Self {
        Self::spawn_named("gateway", Some(bridge_config)).await
    }

    /// Spawns a gateway whose fixture tools tag their output with `source`.
    pub async fn spawn_named(source: &str, bridge_config: Option<&str>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let (bridges, watcher) = match bridge_config {
            Some(contents) => {
                let path = temp_dir.path().join("mcp-bridge.json");
                std::fs::write(&path, contents).expect("Failed to write bridge config");

                let factory =
                    DefaultTransportFactory::new().expect("Failed to build transport factory");
                let manager = Arc::new(
                    BridgeManager::new(
                        Arc::new(factory),
                        Duration::from_millis(BRIDGE_TIMEOUT_MS),
                    )
                    .with_config_path(path),
                );
                manager
                    .reload_from_file()
                    .await
                    .expect("Failed to load bridge config");
                let watcher =
                    ConfigWatcher::start(manager.clone()).expect("Failed to watch bridge config");
                (Some(manager), Some(watcher))
            }
            None => (None, None),
        };

        let engine = Arc::new(McpEngine::new(
            ServerInfo {
                name: format!("test-{}", source),
                version: "0.0.0".to_string(),
            },
            bridges.clone(),
        ));
        engine
            .reload_components(test_routes(source), test_prompts(), test_resources())
            .await;

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            ..Default::default()
        };
        let app = make_app(config, engine.clone());

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            engine,
            bridges,
            _temp_dir: temp_dir,
            _watcher: watcher,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// JSON-RPC endpoint URL
    pub fn mcp_url(&self) -> String {
        format!("{}/mcp", self.base_url)
    }

    /// Path of the watched bridge file
    pub fn bridge_config_path(&self) -> PathBuf {
        self._temp_dir.path().join("mcp-bridge.json")
    }

    /// Replaces the bridge file, which the watcher then picks up.
    pub fn write_bridge_config(&self, contents: &str) {
        std::fs::write(self.bridge_config_path(), contents)
            .expect("Failed to write bridge config");
    }

    /// Waits for the server to become ready by polling `/health`
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

/// The `mcpServers` document for a single HTTP upstream.
pub fn http_bridge_config(name: &str, url: &str) -> String {
    serde_json::json!({ "mcpServers": { name: { "url": url } } }).to_string()
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir is cleaned up automatically
    }
}
