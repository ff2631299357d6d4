//! Clients for end-to-end tests
//!
//! `TestClient` speaks JSON-RPC over HTTP POST; the WebSocket helpers cover
//! the `<mcp_path>/ws` endpoint. When request formats change, update only
//! this file.
#![allow(dead_code)]

use super::constants::*;
use futures::{SinkExt, StreamExt};
use reqwest::Response;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// JSON-RPC over HTTP test client
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    next_id: AtomicI64,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            next_id: AtomicI64::new(1),
        }
    }

    fn mcp_url(&self) -> String {
        format!("{}/mcp", self.base_url)
    }

    // ========================================================================
    // Raw requests
    // ========================================================================

    /// POSTs `body` verbatim to the JSON-RPC endpoint.
    pub async fn post_raw(&self, body: impl Into<String>) -> Response {
        self.client
            .post(self.mcp_url())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .send()
            .await
            .expect("POST request failed")
    }

    /// POSTs a JSON value and decodes the JSON answer.
    pub async fn post_json(&self, body: Value) -> Value {
        let response = self.post_raw(body.to_string()).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        response.json().await.expect("Response is not JSON")
    }

    // ========================================================================
    // JSON-RPC helpers
    // ========================================================================

    /// Sends one request and returns the whole response envelope.
    pub async fn rpc(&self, method: &str, params: Option<Value>) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = json!({ "jsonrpc": "2.0", "id": id, "method": method });
        if let Some(params) = params {
            request["params"] = params;
        }
        let response = self.post_json(request).await;
        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], id);
        response
    }

    /// Sends one request and returns its `result`, failing on an error.
    pub async fn rpc_result(&self, method: &str, params: Option<Value>) -> Value {
        let response = self.rpc(method, params).await;
        assert!(
            response.get("error").is_none(),
            "{} failed: {}",
            method,
            response["error"]
        );
        response["result"].clone()
    }

    pub async fn tool_names(&self) -> Vec<String> {
        let result = self.rpc_result("tools/list", None).await;
        result["tools"]
            .as_array()
            .expect("tools is not an array")
            .iter()
            .map(|tool| tool["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Value {
        self.rpc_result(
            "tools/call",
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    pub async fn health(&self) -> Value {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .expect("Health request failed")
            .json()
            .await
            .expect("Health is not JSON")
    }
}

// ============================================================================
// WebSocket helpers
// ============================================================================

/// Connects to `<base_url>/mcp/ws`.
pub async fn connect_ws(base_url: &str) -> WsStream {
    let ws_url = base_url.replace("http://", "ws://") + "/mcp/ws";
    let (ws_stream, _) = connect_async(ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Sends a text frame and waits for the response carrying `id`, skipping
/// any notifications that arrive first.
pub async fn ws_request(ws: &mut WsStream, request: Value) -> Value {
    let id = request["id"].clone();
    ws.send(Message::Text(request.to_string().into()))
        .await
        .expect("Failed to send WebSocket message");

    let deadline = Duration::from_millis(NOTIFICATION_TIMEOUT_MS);
    timeout(deadline, async {
        loop {
            let message = next_json(ws).await;
            if message["id"] == id {
                return message;
            }
        }
    })
    .await
    .expect("No WebSocket response in time")
}

/// Waits for a notification whose method is `method` and whose params
/// satisfy `matches`. Returns None on timeout.
pub async fn wait_for_notification(
    ws: &mut WsStream,
    method: &str,
    matches: impl Fn(&Value) -> bool,
) -> Option<Value> {
    let deadline = Duration::from_millis(NOTIFICATION_TIMEOUT_MS);
    timeout(deadline, async {
        loop {
            let message = next_json(ws).await;
            if message["method"] == method && matches(&message["params"]) {
                return message;
            }
        }
    })
    .await
    .ok()
}

async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(text.as_str()).expect("Frame is not JSON");
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("WebSocket error: {}", e),
            None => panic!("WebSocket closed"),
        }
    }
}
