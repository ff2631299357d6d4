//! HTTP transport: JSON-RPC over POST, notifications over SSE.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::state::{GuardedEngine, ServerState};
use crate::bridge::BridgeStatus;
use crate::mcp::connections::{ConnectionKind, ConnectionManager};
use crate::mcp::McpNotification;

/// `POST <mcp_path>`: one envelope or a batch in, the answer out.
pub async fn post_mcp(State(engine): State<GuardedEngine>, body: String) -> Response {
    match engine.process_text(&body).await {
        Some(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            output.to_json(),
        )
            .into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// `GET <mcp_path>`: an SSE stream of notifications for clients asking for
/// `text/event-stream`, 405 for everybody else.
pub async fn get_mcp(State(engine): State<GuardedEngine>, headers: HeaderMap) -> Response {
    let wants_events = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false);

    if !wants_events {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "POST")],
            "Use POST for JSON-RPC or Accept: text/event-stream for notifications",
        )
            .into_response();
    }

    let connections = engine.connections().clone();
    let (id, rx) = connections.register(ConnectionKind::Sse).await;
    debug!("SSE listener {} connected", id);

    Sse::new(notification_stream(rx, SseGuard { id, connections }))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

/// Unregisters the SSE listener once axum drops the stream.
struct SseGuard {
    id: String,
    connections: Arc<ConnectionManager>,
}

impl Drop for SseGuard {
    fn drop(&mut self) {
        let id = std::mem::take(&mut self.id);
        let connections = self.connections.clone();
        debug!("SSE listener {} disconnected", id);
        tokio::spawn(async move { connections.unregister(&id).await });
    }
}

fn notification_stream(
    rx: mpsc::Receiver<McpNotification>,
    guard: SseGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((rx, guard), |(mut rx, guard)| async move {
        loop {
            let notification = rx.recv().await?;
            match serde_json::to_string(&notification) {
                Ok(data) => {
                    let event = Event::default().event("message").data(data);
                    return Some((Ok(event), (rx, guard)));
                }
                Err(e) => error!("Failed to serialize notification: {}", e),
            }
        }
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    status: &'static str,
    version: &'static str,
    uptime: String,
    tools: usize,
    prompts: usize,
    resources: usize,
    connections: usize,
    bridges: Vec<BridgeStatus>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

/// `GET /health`
pub async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    let snapshot = state.engine.snapshot();
    Json(HealthReport {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime: format_uptime(state.start_time.elapsed()),
        tools: snapshot.tools().len(),
        prompts: snapshot.prompts().len(),
        resources: snapshot.resources().len(),
        connections: state.engine.connections().total_connections().await,
        bridges: state
            .engine
            .bridges()
            .map(|b| b.statuses())
            .unwrap_or_default(),
    })
}
