//! End-to-end tests for bridging
//!
//! A downstream gateway bridges an upstream gateway over real HTTP: probing,
//! the SSE notification stream, name collisions, unresponsive upstreams and
//! hot-reload of the bridge file.

mod common;

use common::{
    connect_ws, http_bridge_config, test_routes, wait_for_notification, ws_request, TestClient,
    TestServer, UserLookup, BRIDGE_TIMEOUT_MS, ECHO_TOOL, UPSTREAM_NAME, USER_TOOL,
};
use mcp_gateway::mcp::connections::ConnectionKind;
use mcp_gateway::mcp::routes::HttpMethod;
use mcp_gateway::mcp::RouteDefinition;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

/// Accepts TCP connections and never answers them.
async fn spawn_black_hole() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    url
}

fn text_of(result: &Value) -> Value {
    let text = result["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn test_bridged_tools_are_listed_and_collisions_prefixed() {
    let upstream = TestServer::spawn_named("upstream", None).await;
    let downstream =
        TestServer::spawn_with_bridges(&http_bridge_config(UPSTREAM_NAME, &upstream.base_url))
            .await;
    let client = TestClient::new(downstream.base_url.clone());

    let names = client.tool_names().await;

    // Local tools come first and keep their names
    assert_eq!(&names[..2], &[USER_TOOL.to_string(), ECHO_TOOL.to_string()]);
    assert!(names.contains(&format!("{}_{}", UPSTREAM_NAME, USER_TOOL)));
    assert!(names.contains(&format!("{}_{}", UPSTREAM_NAME, ECHO_TOOL)));
    assert_eq!(names.len(), 4);

    let status = &client.health().await["bridges"][0];
    assert_eq!(status["name"], UPSTREAM_NAME);
    assert_eq!(status["sseSupported"], true);
    assert_eq!(
        status["workingEndpoint"],
        format!("{}/mcp", upstream.base_url)
    );
}

#[tokio::test]
async fn test_prefixed_tool_call_reaches_upstream() {
    let upstream = TestServer::spawn_named("upstream", None).await;
    let downstream =
        TestServer::spawn_with_bridges(&http_bridge_config(UPSTREAM_NAME, &upstream.base_url))
            .await;
    let client = TestClient::new(downstream.base_url.clone());
    client.tool_names().await;

    let local = client.call_tool(USER_TOOL, json!({ "id": "1" })).await;
    assert_eq!(text_of(&local)["source"], "gateway");

    let bridged = client
        .call_tool(
            &format!("{}_{}", UPSTREAM_NAME, USER_TOOL),
            json!({ "id": "1" }),
        )
        .await;
    assert_eq!(text_of(&bridged), json!({ "id": "1", "source": "upstream" }));
}

#[tokio::test]
async fn test_call_without_prior_listing_reaches_upstream() {
    let upstream = TestServer::spawn_named("upstream", None).await;
    upstream
        .engine
        .set_routes(vec![RouteDefinition::new(
            HttpMethod::Get,
            "/accounts/:id",
            Arc::new(UserLookup {
                source: "accounts".to_string(),
            }),
        )])
        .await;
    let downstream =
        TestServer::spawn_with_bridges(&http_bridge_config(UPSTREAM_NAME, &upstream.base_url))
            .await;
    let client = TestClient::new(downstream.base_url.clone());

    // No tools/list first: nothing is recorded, the name is tried as given
    let bridged = client
        .call_tool("get_accounts_by_id", json!({ "id": "5" }))
        .await;
    assert_eq!(text_of(&bridged), json!({ "id": "5", "source": "accounts" }));

    let unknown = client
        .rpc(
            "tools/call",
            Some(json!({ "name": "get_nothing", "arguments": {} })),
        )
        .await;
    assert!(unknown["error"]["message"]
        .as_str()
        .unwrap()
        .contains("get_nothing"));
}

#[tokio::test]
async fn test_bridged_prompts_and_resources_fall_through() {
    let upstream = TestServer::spawn_named("upstream", None).await;
    upstream
        .engine
        .set_prompts(vec![mcp_gateway::mcp::PromptDefinition::new(
            "upstream-only",
            "From {{where}}",
        )])
        .await;
    let downstream =
        TestServer::spawn_with_bridges(&http_bridge_config(UPSTREAM_NAME, &upstream.base_url))
            .await;
    let client = TestClient::new(downstream.base_url.clone());

    let listed = client.rpc_result("prompts/list", None).await;
    let names: Vec<&str> = listed["prompts"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert!(names.contains(&"summarize"));
    assert!(names.contains(&"upstream-only"));

    let rendered = client
        .rpc_result(
            "prompts/get",
            Some(json!({ "name": "upstream-only", "arguments": { "where": "alpha" } })),
        )
        .await;
    assert_eq!(rendered["messages"][0]["content"]["text"], "From alpha");

    let missing = client
        .rpc("prompts/get", Some(json!({ "name": "nowhere" })))
        .await;
    assert!(missing.get("error").is_some());
}

#[tokio::test]
async fn test_unresponsive_bridge_does_not_block_listing() {
    let upstream = TestServer::spawn_named("upstream", None).await;
    let black_hole = spawn_black_hole().await;
    let config = json!({
        "mcpServers": {
            UPSTREAM_NAME: { "url": upstream.base_url },
            "stalled": { "url": black_hole }
        }
    })
    .to_string();
    let downstream = TestServer::spawn_with_bridges(&config).await;
    let client = TestClient::new(downstream.base_url.clone());

    let started = Instant::now();
    let names = client.tool_names().await;
    assert!(started.elapsed() < Duration::from_millis(BRIDGE_TIMEOUT_MS * 2));
    assert!(names.contains(&format!("{}_{}", UPSTREAM_NAME, USER_TOOL)));

    let statuses = client.health().await["bridges"].clone();
    let stalled = statuses
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == "stalled")
        .unwrap()
        .clone();
    assert!(stalled["state"].as_str().unwrap().starts_with("error"));
}

#[tokio::test]
async fn test_upstream_changes_are_relayed() {
    let upstream = TestServer::spawn_named("upstream", None).await;
    let downstream =
        TestServer::spawn_with_bridges(&http_bridge_config(UPSTREAM_NAME, &upstream.base_url))
            .await;
    assert_eq!(
        upstream
            .engine
            .connections()
            .connection_count(ConnectionKind::Sse)
            .await,
        1
    );

    let mut ws = connect_ws(&downstream.base_url).await;
    ws_request(&mut ws, json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" })).await;

    upstream.engine.set_routes(test_routes("upstream-v2")).await;

    let relayed = wait_for_notification(&mut ws, "notifications/toolsChanged", |params| {
        params["server"] == UPSTREAM_NAME
    })
    .await
    .expect("Upstream change was not relayed");
    assert_eq!(relayed["params"]["source"], "bridge");
}

#[tokio::test]
async fn test_bridge_file_hot_reload() {
    let upstream = TestServer::spawn_named("upstream", None).await;
    let downstream = TestServer::spawn_with_bridges(r#"{"mcpServers": {}}"#).await;
    let client = TestClient::new(downstream.base_url.clone());
    assert_eq!(client.tool_names().await.len(), 2);

    let mut ws = connect_ws(&downstream.base_url).await;
    ws_request(&mut ws, json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" })).await;

    downstream.write_bridge_config(&http_bridge_config(UPSTREAM_NAME, &upstream.base_url));

    wait_for_notification(&mut ws, "notifications/mcpComponentsRefreshed", |_| true)
        .await
        .expect("Reload was not announced");
    let names = client.tool_names().await;
    assert!(names.contains(&format!("{}_{}", UPSTREAM_NAME, USER_TOOL)));

    // A broken file keeps the current bridges
    downstream.write_bridge_config("{ not json");
    tokio::time::sleep(Duration::from_millis(600)).await;
    let names = client.tool_names().await;
    assert!(names.contains(&format!("{}_{}", UPSTREAM_NAME, USER_TOOL)));

    // Removing the entry drops its tools
    downstream.write_bridge_config(r#"{"mcpServers": {}}"#);
    let deadline = Instant::now() + Duration::from_secs(10);
    while client.tool_names().await.len() != 2 {
        assert!(Instant::now() < deadline, "Removed bridge is still listed");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(downstream.bridges.as_ref().unwrap().snapshot().is_empty());
}

#[tokio::test]
async fn test_stdio_bridge_to_child_gateway() {
    let config = json!({
        "mcpServers": {
            "child": {
                "command": env!("CARGO_BIN_EXE_mcp-gateway"),
                "args": [
                    "--transport", "stdio",
                    "--no-watch",
                    "--bridge-config", "/nonexistent/mcp-bridge.json"
                ],
                "env": { "LOG_LEVEL": "warn" }
            }
        }
    })
    .to_string();
    let downstream = TestServer::spawn_with_bridges(&config).await;
    let client = TestClient::new(downstream.base_url.clone());

    let status = &client.health().await["bridges"][0];
    assert_eq!(status["name"], "child");
    assert_eq!(status["state"], "active");

    // The child serves no tools of its own
    assert_eq!(client.tool_names().await.len(), 2);
    let unknown = client
        .rpc(
            "tools/call",
            Some(json!({ "name": "get_nothing", "arguments": {} })),
        )
        .await;
    assert!(unknown.get("error").is_some());
}
