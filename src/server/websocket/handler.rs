//! WebSocket route handler.
//!
//! Handles WebSocket upgrade, message loop, and cleanup.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::mcp::connections::{ConnectionKind, CHANNEL_CAPACITY};
use crate::mcp::dispatcher::DispatchOutput;
use crate::mcp::McpNotification;
use crate::server::state::GuardedEngine;

/// WebSocket upgrade handler for `GET <mcp_path>/ws`.
pub async fn mcp_ws_handler(ws: WebSocketUpgrade, State(engine): State<GuardedEngine>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, engine))
}

/// Handle an established WebSocket connection.
async fn handle_socket(socket: WebSocket, engine: GuardedEngine) {
    // Register connection and get receiver for notifications
    let (connection_id, notifications) = engine
        .connections()
        .register(ConnectionKind::WebSocket)
        .await;
    debug!("MCP WebSocket {} connected", connection_id);

    let (ws_sink, ws_stream) = socket.split();
    let (responses_tx, responses_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

    let outgoing_handle = tokio::spawn(forward_outgoing(ws_sink, responses_rx, notifications));

    process_incoming(ws_stream, &engine, responses_tx).await;

    debug!("MCP WebSocket {} disconnected", connection_id);
    outgoing_handle.abort();
    engine.connections().unregister(&connection_id).await;
}

/// Forward responses and notifications to the WebSocket.
async fn forward_outgoing(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut responses: mpsc::Receiver<String>,
    mut notifications: mpsc::Receiver<McpNotification>,
) {
    loop {
        let text = tokio::select! {
            response = responses.recv() => match response {
                Some(text) => text,
                None => break,
            },
            notification = notifications.recv() => match notification {
                Some(notification) => match serde_json::to_string(&notification) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to serialize MCP notification: {}", e);
                        continue;
                    }
                },
                None => break,
            },
        };

        if ws_sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

/// Process incoming messages from the WebSocket.
async fn process_incoming(
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    engine: &GuardedEngine,
    responses: mpsc::Sender<String>,
) {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let output = engine.process_text(text.as_str()).await;
                if !respond(&responses, output).await {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                let output = engine.process_bytes(&data).await;
                if !respond(&responses, output).await {
                    break;
                }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Axum/tungstenite answers pings automatically
            }
            Ok(Message::Close(_)) => {
                debug!("Received close frame");
                break;
            }
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
        }
    }
}

/// Queues a dispatch result for the socket. Returns false once the
/// forwarding task is gone.
async fn respond(responses: &mpsc::Sender<String>, output: Option<DispatchOutput>) -> bool {
    match output {
        Some(output) => responses.send(output.to_json()).await.is_ok(),
        None => true,
    }
}
