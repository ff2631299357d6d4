use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use super::http::{get_mcp, health, post_mcp};
use super::metrics::metrics_handler;
use super::websocket::mcp_ws_handler;
use super::{log_requests, state::*, ServerConfig};
use crate::mcp::McpEngine;

pub fn make_app(config: ServerConfig, engine: Arc<McpEngine>) -> Router {
    let state = ServerState::new(config.clone(), engine);

    let mcp_routes: Router = Router::new()
        .route(&config.mcp_path, post(post_mcp).get(get_mcp))
        .route(&config.ws_path(), get(mcp_ws_handler))
        .with_state(state.clone());

    let service_routes: Router = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone());

    mcp_routes
        .merge(service_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .layer(CorsLayer::permissive())
}

/// Serves the HTTP, SSE and WebSocket transports until `shutdown` resolves.
pub async fn run_server<F>(config: ServerConfig, engine: Arc<McpEngine>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = format!("{}:{}", config.host, config.port);
    let mcp_path = config.mcp_path.clone();
    let app = make_app(config, engine);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("MCP endpoint listening on http://{}{}", address, mcp_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}
