//! Fixture catalog shared by the end-to-end tests
//!
//! Every spawned gateway serves the same routes, prompts and resources. The
//! `source` tag ends up in tool output so tests can tell which server
//! actually handled a call.
#![allow(dead_code)]

use async_trait::async_trait;
use mcp_gateway::mcp::registry::ResourceData;
use mcp_gateway::mcp::routes::{
    HttpMethod, RouteError, RouteProcessor, RouteRequest, RouteResponse,
};
use mcp_gateway::mcp::{PromptDefinition, ResourceBuilder, ResourceDefinition, RouteDefinition};
use serde_json::json;
use std::sync::Arc;

use super::constants::*;

/// `GET /users/:id`: answers with the id and the serving gateway's tag.
pub struct UserLookup {
    pub source: String,
}

#[async_trait]
impl RouteProcessor for UserLookup {
    async fn process(&self, request: RouteRequest) -> Result<RouteResponse, RouteError> {
        let id = request
            .params
            .get("id")
            .ok_or_else(|| RouteError::InvalidInput("id is required".to_string()))?;
        if id == "missing" {
            return Ok(RouteResponse::with_status(
                404,
                json!({ "error": "no such user" }),
            ));
        }
        Ok(RouteResponse::ok(json!({
            "id": id,
            "source": self.source,
        })))
    }
}

/// `POST /echo`: returns the request body.
struct Echo;

#[async_trait]
impl RouteProcessor for Echo {
    async fn process(&self, request: RouteRequest) -> Result<RouteResponse, RouteError> {
        Ok(RouteResponse::ok(request.body.unwrap_or(json!(null))))
    }
}

pub fn test_routes(source: &str) -> Vec<RouteDefinition> {
    vec![
        RouteDefinition::new(
            HttpMethod::Get,
            "/users/:id",
            Arc::new(UserLookup {
                source: source.to_string(),
            }),
        ),
        RouteDefinition::new(HttpMethod::Post, "/echo", Arc::new(Echo)),
    ]
}

pub fn test_prompts() -> Vec<PromptDefinition> {
    vec![PromptDefinition::new(SUMMARY_PROMPT, "Summarize {{topic}} for {{audience}}.")
        .description("Summarize a topic")
        .arguments(json!({
            "type": "object",
            "properties": {
                "topic": { "type": "string", "description": "What to summarize" },
                "audience": { "type": "string" }
            },
            "required": ["topic"]
        }))]
}

pub fn test_resources() -> Vec<ResourceDefinition> {
    vec![
        ResourceBuilder::new(README_URI, "readme")
            .mime_type("text/markdown")
            .text("# Test gateway"),
        ResourceBuilder::new(USER_RESOURCE_TEMPLATE, "user-profile")
            .mime_type("application/json")
            .format("json")
            .build(|_uri, params| async move {
                let id = params.get("id").cloned().unwrap_or_default();
                Ok(ResourceData::Text(json!({ "id": id }).to_string()))
            }),
    ]
}
