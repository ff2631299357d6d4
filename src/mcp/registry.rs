//! MCP Tool, Prompt and Resource entities
//!
//! These are the catalog entries the engine serves. Tools are built from
//! routes by the tool builder; prompts and resources are handed in directly
//! by the embedding application.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::protocol::{
    PromptArgument, PromptListing, ResourceListing, ResourceTemplateListing, ToolDefinition,
};
use super::routes::{HttpMethod, RouteError, RouteProcessor};
use super::schema::empty_object_schema;

// ============================================================================
// Tool Types
// ============================================================================

/// A tool in the catalog.
///
/// Local tools carry the HTTP `method`/`path` of the route they came from.
/// Bridge tools carry the upstream back-reference instead, used only when
/// resolving a call and never sent to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub method: Option<HttpMethod>,
    pub path: Option<String>,
    pub input_schema: Value,
    pub response_schema: Option<Value>,
    pub tags: Vec<String>,
    pub bridge_tool_name: Option<String>,
    pub bridge_server_name: Option<String>,
}

impl Tool {
    pub fn is_bridged(&self) -> bool {
        self.bridge_server_name.is_some()
    }

    /// Wire representation for `tools/list`.
    pub fn to_definition(&self) -> ToolDefinition {
        let annotations = match (&self.method, &self.path) {
            (Some(method), Some(path)) => Some(json!({
                "method": method.as_str(),
                "path": path,
                "tags": self.tags,
            })),
            _ => None,
        };
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
            annotations,
        }
    }
}

/// A local tool together with the processor that serves it
#[derive(Clone)]
pub struct RegisteredTool {
    pub tool: Tool,
    pub processor: Arc<dyn RouteProcessor>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Prompt Types
// ============================================================================

/// A canned prompt.
///
/// `arguments` is a JSON-Schema object whose properties are the template
/// placeholders; names listed in its `required` array must be supplied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub template: String,
    #[serde(default = "empty_object_schema")]
    pub arguments: Value,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl PromptDefinition {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            instructions: None,
            template: template.into(),
            arguments: empty_object_schema(),
            format: None,
            mime_type: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn arguments(mut self, schema: Value) -> Self {
        self.arguments = schema;
        self
    }

    /// Argument list derived from the argument schema, in property order.
    pub fn argument_list(&self) -> Vec<PromptArgument> {
        // A plain MCP-style argument array is accepted as well.
        if let Ok(args) = serde_json::from_value::<Vec<PromptArgument>>(self.arguments.clone()) {
            return args;
        }

        let required: Vec<&str> = self
            .arguments
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        self.arguments
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop)| PromptArgument {
                        name: name.clone(),
                        description: prop
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        required: required.contains(&name.as_str()),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn to_listing(&self) -> PromptListing {
        PromptListing {
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: self.argument_list(),
        }
    }
}

// ============================================================================
// Resource Types
// ============================================================================

/// Concrete resource payload
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceData {
    Text(String),
    Blob(Vec<u8>),
}

/// Result type for dynamic resource reads
pub type ResourceResult = Result<ResourceData, RouteError>;

/// Boxed future for async resource reads
pub type ResourceFuture = Pin<Box<dyn Future<Output = ResourceResult> + Send>>;

/// Produces resource content on demand. Receives the requested URI and the
/// parameters extracted from the URI template.
pub type ResourceReader =
    Arc<dyn Fn(String, HashMap<String, String>) -> ResourceFuture + Send + Sync>;

#[derive(Clone)]
pub enum ResourceBody {
    Text(String),
    Blob(Vec<u8>),
    Dynamic(ResourceReader),
}

impl std::fmt::Debug for ResourceBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceBody::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            ResourceBody::Blob(bytes) => f.debug_tuple("Blob").field(&bytes.len()).finish(),
            ResourceBody::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// A static or dynamic resource. A `uri` containing `{param}` placeholders
/// is a template and is advertised through `resources/templates/list`.
#[derive(Debug, Clone)]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    pub format: Option<String>,
    pub body: ResourceBody,
}

impl ResourceDefinition {
    pub fn is_template(&self) -> bool {
        self.uri.contains('{')
    }

    pub fn to_listing(&self) -> ResourceListing {
        ResourceListing {
            uri: self.uri.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }

    pub fn to_template_listing(&self) -> ResourceTemplateListing {
        ResourceTemplateListing {
            uri_template: self.uri.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Matches a URI against a pattern with `{param}` placeholders, returning the
/// captured parameters.
///
/// Placeholders match exactly one `/`-separated segment, and may sit inside a
/// segment (`{name}.json`).
pub fn match_uri_pattern(pattern: &str, uri: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let uri_parts: Vec<&str> = uri.split('/').collect();

    if pattern_parts.len() != uri_parts.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (pattern_part, uri_part) in pattern_parts.iter().zip(uri_parts.iter()) {
        match pattern_part.find('{') {
            None => {
                if pattern_part != uri_part {
                    return None;
                }
            }
            Some(open) => {
                let close = pattern_part[open..].find('}')? + open;
                let prefix = &pattern_part[..open];
                let suffix = &pattern_part[close + 1..];
                let value = uri_part.strip_prefix(prefix)?.strip_suffix(suffix)?;
                if value.is_empty() {
                    return None;
                }
                params.insert(pattern_part[open + 1..close].to_string(), value.to_string());
            }
        }
    }

    Some(params)
}

// ============================================================================
// Builder helpers
// ============================================================================

/// Builder for a resource definition
pub struct ResourceBuilder {
    uri: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    format: Option<String>,
}

impl ResourceBuilder {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            format: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn text(self, text: impl Into<String>) -> ResourceDefinition {
        self.finish(ResourceBody::Text(text.into()))
    }

    pub fn blob(self, bytes: Vec<u8>) -> ResourceDefinition {
        self.finish(ResourceBody::Blob(bytes))
    }

    pub fn build<F, Fut>(self, reader: F) -> ResourceDefinition
    where
        F: Fn(String, HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResourceResult> + Send + 'static,
    {
        self.finish(ResourceBody::Dynamic(Arc::new(move |uri, params| {
            Box::pin(reader(uri, params))
        })))
    }

    fn finish(self, body: ResourceBody) -> ResourceDefinition {
        ResourceDefinition {
            uri: self.uri,
            name: self.name,
            description: self.description,
            mime_type: self.mime_type,
            format: self.format,
            body,
        }
    }
}
