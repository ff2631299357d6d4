//! STDIO bridge transport: a spawned child process speaking newline-delimited
//! JSON-RPC on its stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::BridgeError;
use super::transport::{
    as_notification, initialize_request, initialized_notification, into_result, BridgeTransport,
    EventReceiver,
};
use crate::mcp::protocol::{McpRequest, RequestId};

const EVENT_CHANNEL_CAPACITY: usize = 64;

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<Value>>>>;

struct StdioProcess {
    child: Child,
    stdin: ChildStdin,
    reader: JoinHandle<()>,
}

pub struct StdioBridgeTransport {
    name: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    process: tokio::sync::Mutex<Option<StdioProcess>>,
    pending: PendingMap,
    events: Mutex<Option<EventReceiver>>,
    next_id: AtomicI64,
}

/// Removes a pending entry when the waiting future goes away, so a timed-out
/// request does not leak its slot.
struct PendingGuard {
    pending: PendingMap,
    id: i64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

impl StdioBridgeTransport {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            env,
            process: tokio::sync::Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            events: Mutex::new(None),
            next_id: AtomicI64::new(1),
        }
    }

    /// Number of requests still waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn write_line(&self, message: &McpRequest) -> Result<(), BridgeError> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| BridgeError::InvalidResponse(e.to_string()))?;
        line.push('\n');

        let mut process = self.process.lock().await;
        let process = process.as_mut().ok_or(BridgeError::Closed)?;
        process.stdin.write_all(line.as_bytes()).await?;
        process.stdin.flush().await?;
        Ok(())
    }

    async fn request(&self, request: McpRequest, id: i64) -> Result<Value, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
        let _guard = PendingGuard {
            pending: self.pending.clone(),
            id,
        };

        self.write_line(&request).await?;
        let response = rx.await.map_err(|_| BridgeError::Closed)?;
        into_result(response)
    }

    fn spawn_reader(
        name: String,
        stdout: tokio::process::ChildStdout,
        pending: PendingMap,
        events: mpsc::Sender<McpRequest>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Bridge {}: failed reading stdout: {}", name, e);
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let value: Value = match serde_json::from_str(line) {
                    Ok(value) => value,
                    Err(_) => {
                        debug!("Bridge {}: ignoring non-JSON output: {}", name, line);
                        continue;
                    }
                };

                if let Some(id) = value.get("id").and_then(Value::as_i64) {
                    if value.get("method").is_none() {
                        let waiter = pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
                        match waiter {
                            Some(waiter) => {
                                let _ = waiter.send(value);
                            }
                            None => debug!("Bridge {}: late response for id {}", name, id),
                        }
                        continue;
                    }
                }

                match as_notification(value) {
                    Some(notification) => {
                        if events.try_send(notification).is_err() {
                            debug!("Bridge {}: notification dropped", name);
                        }
                    }
                    None => debug!("Bridge {}: ignoring server-initiated request", name),
                }
            }
            debug!("Bridge {}: stdout closed", name);
            // Wake every waiter: their senders drop with the map entries.
            pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
        })
    }
}

#[async_trait]
impl BridgeTransport for StdioBridgeTransport {
    async fn connect(&self) -> Result<Value, BridgeError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::InvalidResponse("Child has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::InvalidResponse("Child has no stdout".to_string()))?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let reader = Self::spawn_reader(self.name.clone(), stdout, self.pending.clone(), events_tx);
        *self.events.lock().unwrap_or_else(|e| e.into_inner()) = Some(events_rx);
        *self.process.lock().await = Some(StdioProcess {
            child,
            stdin,
            reader,
        });

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let result = self
            .request(initialize_request(RequestId::Number(id)), id)
            .await?;
        self.notify(initialized_notification()).await?;
        info!("Bridge {} started `{}`", self.name, self.command);
        Ok(result)
    }

    async fn send(&self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = McpRequest::new(RequestId::Number(id), method, params);
        self.request(request, id).await
    }

    async fn notify(&self, notification: McpRequest) -> Result<(), BridgeError> {
        self.write_line(&notification).await
    }

    async fn open_event_stream(&self) -> Result<EventReceiver, BridgeError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(BridgeError::Closed)
    }

    async fn close(&self) {
        if let Some(mut process) = self.process.lock().await.take() {
            process.reader.abort();
            if let Err(e) = process.child.kill().await {
                debug!("Bridge {}: kill failed: {}", self.name, e);
            }
            debug!("Bridge {} stopped", self.name);
        }
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn endpoint(&self) -> Option<String> {
        Some(format!("stdio:{}", self.command))
    }
}
