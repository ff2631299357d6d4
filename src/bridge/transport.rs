//! Transport seam between a bridge client and its upstream server.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::config::{BridgeEndpoint, BridgeServerConfig};
use super::error::BridgeError;
use super::http::HttpBridgeTransport;
use super::stdio::StdioBridgeTransport;
use crate::mcp::protocol::{methods, McpRequest, RequestId, MCP_PROTOCOL_VERSION};

/// Client name announced to upstream servers
pub const CLIENT_NAME: &str = "mcp-gateway";

/// Notifications the upstream pushes on its own
pub type EventReceiver = mpsc::Receiver<McpRequest>;

/// One way of talking JSON-RPC to an upstream MCP server.
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    /// Finds a working endpoint and performs the MCP handshake. Returns the
    /// upstream's `initialize` result.
    async fn connect(&self) -> Result<Value, BridgeError>;

    /// Sends one request and waits for its `result`. The transport assigns
    /// the request id. An upstream error object comes back as
    /// [`BridgeError::Rpc`].
    ///
    /// Callers bound the wait with their own timeout; dropping the future
    /// must release any per-request state.
    async fn send(&self, method: &str, params: Option<Value>) -> Result<Value, BridgeError>;

    /// Sends a notification. No answer is expected.
    async fn notify(&self, notification: McpRequest) -> Result<(), BridgeError>;

    /// Opens the upstream's asynchronous notification channel. An error means
    /// the upstream does not offer one.
    async fn open_event_stream(&self) -> Result<EventReceiver, BridgeError>;

    /// Releases sockets, listeners and child processes.
    async fn close(&self);

    /// Human-readable endpoint the transport settled on, once connected.
    fn endpoint(&self) -> Option<String>;
}

/// Builds transports for configured bridges.
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &BridgeServerConfig) -> Result<Arc<dyn BridgeTransport>, BridgeError>;
}

/// Real transports: HTTP through a shared `reqwest` client, STDIO through
/// spawned child processes.
pub struct DefaultTransportFactory {
    http: reqwest::Client,
}

impl DefaultTransportFactory {
    pub fn new() -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("{}/{}", CLIENT_NAME, env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(&self, config: &BridgeServerConfig) -> Result<Arc<dyn BridgeTransport>, BridgeError> {
        match &config.endpoint {
            BridgeEndpoint::Http { url, headers } => Ok(Arc::new(HttpBridgeTransport::new(
                &config.name,
                url,
                headers.clone(),
                self.http.clone(),
            ))),
            BridgeEndpoint::Stdio { command, args, env } => Ok(Arc::new(
                StdioBridgeTransport::new(&config.name, command, args.clone(), env.clone()),
            )),
        }
    }
}

/// The `initialize` request sent to every upstream.
pub fn initialize_request(id: RequestId) -> McpRequest {
    McpRequest::new(
        id,
        methods::INITIALIZE,
        Some(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        })),
    )
}

pub fn initialized_notification() -> McpRequest {
    McpRequest::notification(methods::INITIALIZED, None)
}

/// Whether a JSON value is a JSON-RPC response envelope.
pub fn is_rpc_response(value: &Value) -> bool {
    value.get("jsonrpc").and_then(Value::as_str) == Some("2.0")
        && (value.get("result").is_some() || value.get("error").is_some())
}

/// Turns a response envelope into the call's outcome.
pub fn into_result(response: Value) -> Result<Value, BridgeError> {
    if let Some(error) = response.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_i64)
            .unwrap_or(i64::from(crate::mcp::protocol::error_codes::INTERNAL_ERROR));
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown upstream error")
            .to_string();
        return Err(BridgeError::Rpc {
            code: code as i32,
            message,
        });
    }
    match response {
        Value::Object(mut obj) => obj
            .remove("result")
            .ok_or_else(|| BridgeError::InvalidResponse("Response has no result".to_string())),
        _ => Err(BridgeError::InvalidResponse(
            "Response is not an object".to_string(),
        )),
    }
}

/// Upstream notification from a raw JSON value. Requests (with an id) and
/// responses are not notifications.
pub fn as_notification(value: Value) -> Option<McpRequest> {
    if value.get("id").is_some() {
        return None;
    }
    serde_json::from_value::<McpRequest>(value).ok()
}
