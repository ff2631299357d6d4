//! STDIO transport: newline-delimited JSON-RPC on a reader/writer pair.
//!
//! Every line read is one envelope or batch; every answer and notification is
//! written as exactly one line. Nothing but protocol traffic goes to the
//! writer, so logs must be routed elsewhere when the writer is stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use crate::mcp::connections::ConnectionKind;
use crate::mcp::McpEngine;

/// Runs the STDIO loop until the reader reaches EOF.
pub async fn serve_stdio<R, W>(engine: Arc<McpEngine>, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (connection_id, mut notifications) =
        engine.connections().register(ConnectionKind::Stdio).await;
    info!("MCP STDIO session {} started", connection_id);

    let mut lines = BufReader::new(reader).lines();
    let result = loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e).context("Failed to read from stdin"),
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Some(output) = engine.process_text(line).await {
                    if let Err(e) = write_line(&mut writer, &output.to_json()).await {
                        break Err(e);
                    }
                }
            }
            Some(notification) = notifications.recv() => {
                match serde_json::to_string(&notification) {
                    Ok(text) => {
                        if let Err(e) = write_line(&mut writer, &text).await {
                            break Err(e);
                        }
                    }
                    Err(e) => error!("Failed to serialize notification: {}", e),
                }
            }
        }
    };

    engine.connections().unregister(&connection_id).await;
    debug!("MCP STDIO session {} ended", connection_id);
    result
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> Result<()> {
    writer
        .write_all(text.as_bytes())
        .await
        .context("Failed to write to stdout")?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::ServerInfo;
    use serde_json::Value;
    use tokio::io::duplex;

    fn engine() -> Arc<McpEngine> {
        Arc::new(McpEngine::new(
            ServerInfo {
                name: "stdio-test".to_string(),
                version: "0".to_string(),
            },
            None,
        ))
    }

    #[tokio::test]
    async fn answers_one_line_per_request_and_skips_blank_lines() {
        let (mut client, server) = duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let engine = engine();
        let task = tokio::spawn(serve_stdio(engine.clone(), server_read, server_write));

        client
            .write_all(
                b"\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\
                  {\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n\
                  [{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"},{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"nope\"}]\n",
            )
            .await
            .unwrap();

        let (client_read, client_write) = tokio::io::split(client);
        let mut lines = BufReader::new(client_read).lines();

        let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["id"], 1);
        assert!(first["result"].is_object());

        let batch: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let batch = batch.as_array().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1]["error"]["code"], -32601);

        drop(client_write);
        drop(lines);
        task.await.unwrap().unwrap();
        assert_eq!(engine.connections().total_connections().await, 0);
    }

    #[tokio::test]
    async fn forwards_notifications_as_lines() {
        let (client, server) = duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let engine = engine();
        let task = tokio::spawn(serve_stdio(engine.clone(), server_read, server_write));

        while engine.connections().total_connections().await == 0 {
            tokio::task::yield_now().await;
        }
        engine.system().tools_changed().await;

        let (client_read, client_write) = tokio::io::split(client);
        let mut lines = BufReader::new(client_read).lines();
        let line: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(line["method"], "notifications/toolsChanged");
        assert!(line.get("id").is_none());

        drop(client_write);
        drop(lines);
        task.await.unwrap().unwrap();
    }
}
