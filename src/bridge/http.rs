//! Streamable-HTTP bridge transport.
//!
//! Probes `<url>/mcp` and then `<url>` with an `initialize` request, and
//! sticks to the first candidate that answers like an MCP server. POST
//! answers may be plain JSON or a `text/event-stream`; the event-stream GET
//! on the working endpoint carries upstream notifications.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::error::BridgeError;
use super::sse::event_stream;
use super::transport::{
    as_notification, initialize_request, initialized_notification, into_result, is_rpc_response,
    BridgeTransport, EventReceiver,
};
use crate::mcp::protocol::{McpRequest, RequestId};

/// Session header of the Streamable HTTP transport
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Endpoints tried during probing, in order.
pub fn probe_candidates(base_url: &str) -> Vec<String> {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/mcp") {
        vec![base.to_string()]
    } else {
        vec![format!("{}/mcp", base), base.to_string()]
    }
}

pub struct HttpBridgeTransport {
    name: String,
    base_url: String,
    headers: HashMap<String, String>,
    client: Client,
    endpoint: Mutex<Option<String>>,
    session_id: Mutex<Option<String>>,
    next_id: AtomicI64,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl HttpBridgeTransport {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        headers: HashMap<String, String>,
        client: Client,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            headers,
            client,
            endpoint: Mutex::new(None),
            session_id: Mutex::new(None),
            next_id: AtomicI64::new(1),
            listener: Mutex::new(None),
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn working_endpoint(&self) -> Option<String> {
        self.endpoint
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_session_id(&self, value: Option<String>) {
        *self.session_id.lock().unwrap_or_else(|e| e.into_inner()) = value;
    }

    fn decorate(&self, mut builder: RequestBuilder) -> RequestBuilder {
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        if let Some(session) = self.session_id() {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder
    }

    /// POSTs one envelope. `Ok(None)` means the server accepted it without
    /// a response body (notifications).
    async fn post(&self, url: &str, body: &McpRequest) -> Result<Option<Value>, BridgeError> {
        let builder = self
            .client
            .post(url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        let response = self.decorate(builder).send().await?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(BridgeError::NotMcpServer(url.to_string()));
        }
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.set_session_id(Some(session.to_string()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.contains("text/html") {
            return Err(BridgeError::NotMcpServer(url.to_string()));
        }
        if status == StatusCode::ACCEPTED || status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        if content_type.contains("text/event-stream") {
            let expected = body.id.as_ref().and_then(|id| serde_json::to_value(id).ok());
            let mut events = Box::pin(event_stream(Box::pin(response.bytes_stream())));
            while let Some(event) = events.next().await {
                let Ok(value) = serde_json::from_str::<Value>(&event.data) else {
                    continue;
                };
                if is_rpc_response(&value)
                    && (expected.is_none() || value.get("id") == expected.as_ref())
                {
                    return Ok(Some(value));
                }
            }
            return Err(BridgeError::InvalidResponse(
                "Event stream ended without a response".to_string(),
            ));
        }

        let text = response.text().await?;
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            return if status.is_success() {
                Ok(None)
            } else {
                Err(BridgeError::InvalidResponse(format!("HTTP {}", status)))
            };
        }
        if trimmed.starts_with('<') {
            return Err(BridgeError::NotMcpServer(url.to_string()));
        }
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|_| BridgeError::NotMcpServer(url.to_string()))?;
        if !is_rpc_response(&value) {
            return Err(BridgeError::NotMcpServer(url.to_string()));
        }
        Ok(Some(value))
    }
}

#[async_trait]
impl BridgeTransport for HttpBridgeTransport {
    async fn connect(&self) -> Result<Value, BridgeError> {
        for candidate in probe_candidates(&self.base_url) {
            self.set_session_id(None);
            let request = initialize_request(self.next_id());
            match self.post(&candidate, &request).await {
                Ok(Some(response)) => {
                    let result = into_result(response)?;
                    *self.endpoint.lock().unwrap_or_else(|e| e.into_inner()) =
                        Some(candidate.clone());
                    if let Err(e) = self.notify(initialized_notification()).await {
                        debug!("Bridge {}: initialized notification failed: {}", self.name, e);
                    }
                    info!("Bridge {} connected via {}", self.name, candidate);
                    return Ok(result);
                }
                Ok(None) => {
                    debug!("Bridge {}: {} gave no response", self.name, candidate);
                }
                Err(e) => {
                    debug!("Bridge {}: {} is not usable: {}", self.name, candidate, e);
                }
            }
        }
        Err(BridgeError::NotMcpServer(self.base_url.clone()))
    }

    async fn send(&self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
        let endpoint = self.working_endpoint().ok_or(BridgeError::Closed)?;
        let request = McpRequest::new(self.next_id(), method, params);
        let response = self
            .post(&endpoint, &request)
            .await?
            .ok_or_else(|| BridgeError::InvalidResponse("Empty response".to_string()))?;
        into_result(response)
    }

    async fn notify(&self, notification: McpRequest) -> Result<(), BridgeError> {
        let endpoint = self.working_endpoint().ok_or(BridgeError::Closed)?;
        self.post(&endpoint, &notification).await.map(|_| ())
    }

    async fn open_event_stream(&self) -> Result<EventReceiver, BridgeError> {
        let endpoint = self.working_endpoint().ok_or(BridgeError::Closed)?;
        let builder = self
            .client
            .get(&endpoint)
            .header(ACCEPT, "text/event-stream");
        let response = self.decorate(builder).send().await?;

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.to_ascii_lowercase().contains("text/event-stream"))
            .unwrap_or(false);
        if !response.status().is_success() || !is_event_stream {
            return Err(BridgeError::InvalidResponse(format!(
                "Event stream unavailable (HTTP {})",
                response.status()
            )));
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let name = self.name.clone();
        let handle = tokio::spawn(async move {
            let mut events = Box::pin(event_stream(Box::pin(response.bytes_stream())));
            while let Some(event) = events.next().await {
                let Ok(value) = serde_json::from_str::<Value>(&event.data) else {
                    debug!("Bridge {}: ignoring non-JSON event", name);
                    continue;
                };
                if let Some(notification) = as_notification(value) {
                    if tx.send(notification).await.is_err() {
                        break;
                    }
                }
            }
            debug!("Bridge {}: event stream closed", name);
        });

        if let Some(previous) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle)
        {
            previous.abort();
        }
        Ok(rx)
    }

    async fn close(&self) {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
        *self.endpoint.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.set_session_id(None);
        debug!("Bridge {} closed", self.name);
    }

    fn endpoint(&self) -> Option<String> {
        self.working_endpoint()
    }
}
