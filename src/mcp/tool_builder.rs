//! Route → Tool conversion
//!
//! Builds one [`Tool`] per route: a deterministic name from method and path,
//! and a single input schema assembled from the route's OpenAPI metadata:
//!
//! - path and query parameters are top-level properties,
//! - header parameters live under a `headers` object,
//! - the JSON request body lives under `body`.
//!
//! [`split_arguments`] performs the inverse when the tool is called.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use tracing::debug;

use super::registry::Tool;
use super::routes::{
    path_parameter_name, path_parameters, HttpMethod, ParameterLocation, RouteDefinition,
    RouteMetadata, RouteRequest,
};
use super::schema::{normalize_input_schema, normalize_schema};

/// Derives the tool name for a route, e.g. `GET /users/:id/posts` →
/// `get_users_by_id_posts`.
pub fn tool_name(method: HttpMethod, path: &str) -> String {
    let mut raw = method.as_str().to_ascii_lowercase();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        raw.push('_');
        match path_parameter_name(segment) {
            Some(param) => {
                raw.push_str("by_");
                raw.push_str(param);
            }
            None => raw.push_str(segment),
        }
    }

    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        let c = if c.is_ascii_alphanumeric() { c } else { '_' };
        if c == '_' && name.ends_with('_') {
            continue;
        }
        name.push(c);
    }
    name.trim_end_matches('_').to_string()
}

pub fn build_tool(route: &RouteDefinition) -> Tool {
    let metadata = route.metadata.clone().unwrap_or_default();
    let description = metadata
        .summary
        .clone()
        .or_else(|| metadata.description.clone())
        .unwrap_or_else(|| format!("{} {}", route.method, route.path));

    let tool = Tool {
        name: tool_name(route.method, &route.path),
        description,
        method: Some(route.method),
        path: Some(route.path.clone()),
        input_schema: build_input_schema(&route.path, &metadata),
        response_schema: response_schema(&metadata),
        tags: metadata.tags.clone(),
        bridge_tool_name: None,
        bridge_server_name: None,
    };
    debug!("Built tool {} for {} {}", tool.name, route.method, route.path);
    tool
}

pub fn build_input_schema(path: &str, metadata: &RouteMetadata) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();
    let mut header_properties = Map::new();
    let mut header_required: Vec<String> = Vec::new();

    for param in &metadata.parameters {
        let mut schema = param
            .schema
            .clone()
            .unwrap_or_else(|| json!({"type": "string"}));
        if let (Some(desc), Some(obj)) = (&param.description, schema.as_object_mut()) {
            obj.entry("description")
                .or_insert_with(|| Value::String(desc.clone()));
        }

        match param.location {
            ParameterLocation::Path => {
                properties.insert(param.name.clone(), schema);
                push_unique(&mut required, &param.name);
            }
            ParameterLocation::Query => {
                properties.insert(param.name.clone(), schema);
                if param.required {
                    push_unique(&mut required, &param.name);
                }
            }
            ParameterLocation::Header => {
                header_properties.insert(param.name.clone(), schema);
                if param.required {
                    push_unique(&mut header_required, &param.name);
                }
            }
            ParameterLocation::Cookie => {}
        }
    }

    // Path segments the metadata did not describe are still required inputs.
    for name in path_parameters(path) {
        properties
            .entry(name.clone())
            .or_insert_with(|| json!({"type": "string"}));
        push_unique(&mut required, &name);
    }

    if !header_properties.is_empty() {
        let mut headers = json!({"type": "object", "properties": header_properties});
        if !header_required.is_empty() {
            headers["required"] = json!(header_required);
            push_unique(&mut required, "headers");
        }
        properties.insert("headers".to_string(), headers);
    }

    if let Some(request_body) = &metadata.request_body {
        let body_schema = request_body_schema(request_body).unwrap_or_else(|| json!({}));
        properties.insert("body".to_string(), body_schema);
        if request_body
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            push_unique(&mut required, "body");
        }
    }

    let mut schema = json!({"type": "object", "properties": properties});
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    normalize_input_schema(&schema)
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

/// `content["application/json"].schema`, then the first content type's
/// schema, then a bare `schema`.
fn request_body_schema(request_body: &Value) -> Option<Value> {
    content_schema(request_body).or_else(|| request_body.get("schema").cloned())
}

fn content_schema(holder: &Value) -> Option<Value> {
    let content = holder.get("content")?.as_object()?;
    content
        .get("application/json")
        .and_then(|c| c.get("schema"))
        .or_else(|| content.values().find_map(|c| c.get("schema")))
        .cloned()
}

/// Picks the success response schema: `200`, `201`, any other `2xx`, then
/// `default`.
pub fn response_schema(metadata: &RouteMetadata) -> Option<Value> {
    let responses = metadata.responses.as_ref()?.as_object()?;

    let mut other_2xx: Vec<&str> = responses
        .keys()
        .map(String::as_str)
        .filter(|k| k.starts_with('2') && *k != "200" && *k != "201")
        .collect();
    other_2xx.sort_unstable();

    let mut keys = vec!["200", "201"];
    keys.extend(other_2xx);
    keys.push("default");

    keys.into_iter()
        .filter_map(|key| responses.get(key))
        .find_map(|response| content_schema(response).or_else(|| response.get("schema").cloned()))
        .map(|schema| normalize_schema(&schema))
}

/// Splits `tools/call` arguments back into the pieces a route expects.
///
/// Path parameters come from the route path, `headers` and `body` from their
/// dedicated properties. Every other argument is a query parameter, except on
/// body-carrying methods without an explicit `body`, where undeclared
/// arguments form the body object.
pub fn split_arguments(tool: &Tool, arguments: &Map<String, Value>) -> RouteRequest {
    let path_params = tool
        .path
        .as_deref()
        .map(path_parameters)
        .unwrap_or_default();
    let declared: Vec<&str> = tool
        .input_schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|p| p.keys().map(String::as_str).collect())
        .unwrap_or_default();
    let carries_body = matches!(
        tool.method,
        Some(HttpMethod::Post) | Some(HttpMethod::Put) | Some(HttpMethod::Patch)
    );

    let mut request = RouteRequest::default();
    let mut loose_body = Map::new();

    for (key, value) in arguments {
        if path_params.iter().any(|p| p == key) {
            request.params.insert(key.clone(), scalar_to_string(value));
            continue;
        }
        match key.as_str() {
            "headers" => {
                if let Value::Object(headers) = value {
                    request.headers = headers
                        .iter()
                        .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                        .collect::<HashMap<_, _>>();
                }
            }
            "body" => request.body = Some(value.clone()),
            _ if carries_body && !declared.contains(&key.as_str()) => {
                loose_body.insert(key.clone(), value.clone());
            }
            _ => {
                request.query.insert(key.clone(), value.clone());
            }
        }
    }

    if request.body.is_none() && !loose_body.is_empty() {
        request.body = Some(Value::Object(loose_body));
    }
    request
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
