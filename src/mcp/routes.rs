//! Route collaborator interface.
//!
//! Endpoint discovery lives outside this crate; it hands the engine a list of
//! [`RouteDefinition`]s, each carrying the processor that actually serves the
//! endpoint plus whatever OpenAPI-flavoured metadata it could extract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// HTTP method of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an OpenAPI parameter is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

/// One OpenAPI `parameters[]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schema: Option<Value>,
}

/// OpenAPI-flavoured metadata extracted for a route.
///
/// `request_body` and `responses` are kept as raw JSON: they come in whatever
/// shape the extractor produced and the tool builder copes with the variants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteMetadata {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub request_body: Option<Value>,
    pub parameters: Vec<ParameterSpec>,
    pub responses: Option<Value>,
}

/// The input a route processor receives when invoked as a tool.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub params: HashMap<String, String>,
    pub query: serde_json::Map<String, Value>,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

/// What a route processor produced.
#[derive(Debug, Clone)]
pub struct RouteResponse {
    pub status: u16,
    pub body: Value,
}

impl RouteResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors raised by route processors.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing failed: {0}")]
    Failed(String),
}

/// The endpoint implementation behind a route.
#[async_trait]
pub trait RouteProcessor: Send + Sync {
    async fn process(&self, request: RouteRequest) -> Result<RouteResponse, RouteError>;
}

/// One discovered route.
#[derive(Clone)]
pub struct RouteDefinition {
    pub method: HttpMethod,
    pub path: String,
    pub processor: Arc<dyn RouteProcessor>,
    pub file_path: Option<String>,
    pub metadata: Option<RouteMetadata>,
}

impl RouteDefinition {
    pub fn new(
        method: HttpMethod,
        path: impl Into<String>,
        processor: Arc<dyn RouteProcessor>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            processor,
            file_path: None,
            metadata: None,
        }
    }

    pub fn file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn metadata(mut self, metadata: RouteMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl std::fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("file_path", &self.file_path)
            .finish_non_exhaustive()
    }
}

/// Returns the parameter names embedded in a route path.
///
/// Understands `:id`, `{id}` and `[id]` segments.
pub fn path_parameters(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(path_parameter_name)
        .map(str::to_string)
        .collect()
}

/// Returns the parameter name if the segment is a parameter placeholder.
pub fn path_parameter_name(segment: &str) -> Option<&str> {
    if let Some(name) = segment.strip_prefix(':') {
        return (!name.is_empty()).then_some(name);
    }
    if let Some(name) = segment
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
    {
        return (!name.is_empty()).then_some(name);
    }
    if let Some(name) = segment
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        // Catch-all segments like `[...slug]`
        let name = name.trim_start_matches("...");
        return (!name.is_empty()).then_some(name);
    }
    None
}
