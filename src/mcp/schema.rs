//! Schema normalization.
//!
//! Tool schemas reach us from two very different places: OpenAPI metadata
//! extracted from local routes, and JSON-Schema documents advertised by
//! bridged MCP servers (often sprinkled with vendor extensions). Everything
//! is funnelled through [`normalize_input_schema`] so clients see one shape.
//!
//! Normalization never fails. Anything we cannot represent is dropped, and a
//! schema that is unusable as a whole degrades to an empty object schema.

use serde_json::{json, Map, Value};

/// `format` values clients are known to understand. Others are dropped.
const KEPT_FORMATS: &[&str] = &[
    "date-time",
    "date",
    "time",
    "email",
    "uri",
    "uuid",
    "hostname",
    "ipv4",
    "ipv6",
];

/// Keywords that carry documentation or tooling hints only.
const DROPPED_KEYWORDS: &[&str] = &[
    "$schema",
    "$id",
    "example",
    "xml",
    "discriminator",
    "externalDocs",
    "nullable",
    "readOnly",
    "writeOnly",
    "deprecated",
];

/// Keywords whose value is a single subschema.
const SUBSCHEMA_KEYWORDS: &[&str] = &["items", "not", "additionalProperties", "contains"];

/// Keywords whose value is a list of subschemas.
const SUBSCHEMA_LIST_KEYWORDS: &[&str] = &["allOf", "anyOf", "oneOf", "prefixItems"];

/// The least specific valid tool input schema.
pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Normalizes a schema used as a tool's `inputSchema`.
///
/// The result is always an object schema with a `properties` map, and its
/// `required` list only names properties that exist.
pub fn normalize_input_schema(schema: &Value) -> Value {
    let Value::Object(_) = schema else {
        return empty_object_schema();
    };

    let mut normalized = normalize_schema(schema);
    let Some(obj) = normalized.as_object_mut() else {
        return empty_object_schema();
    };

    match obj.get("type") {
        None => {
            obj.insert("type".to_string(), json!("object"));
        }
        Some(Value::String(t)) if t == "object" => {}
        Some(_) => {
            // A tool takes named arguments; a non-object root cannot be called.
            return empty_object_schema();
        }
    }

    if !obj.get("properties").map(Value::is_object).unwrap_or(false) {
        obj.insert("properties".to_string(), Value::Object(Map::new()));
        // Nothing can be required once the root has no properties
        filter_required(obj);
    }

    normalized
}

/// Normalizes any schema fragment. Non-object fragments become `{}`
/// (except boolean schemas, which are valid JSON-Schema and kept).
pub fn normalize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(obj) => Value::Object(normalize_object(obj)),
        Value::Bool(b) => Value::Bool(*b),
        _ => Value::Object(Map::new()),
    }
}

fn normalize_object(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    let nullable = obj.get("nullable").and_then(Value::as_bool).unwrap_or(false);

    for (key, value) in obj {
        if key.starts_with("x-") || DROPPED_KEYWORDS.contains(&key.as_str()) {
            continue;
        }

        match key.as_str() {
            "$ref" => {
                // Only local definitions can be resolved by a client; bare
                // OpenAPI component refs cannot, so the ref is dropped and
                // the fragment becomes unconstrained.
                if value
                    .as_str()
                    .map(|r| r.starts_with("#/$defs/") || r.starts_with("#/definitions/"))
                    .unwrap_or(false)
                {
                    out.insert(key.clone(), value.clone());
                }
            }
            "format" => {
                if let Some(format) = value.as_str() {
                    if KEPT_FORMATS.contains(&format) {
                        out.insert(key.clone(), value.clone());
                    }
                }
            }
            "properties" | "$defs" | "definitions" | "patternProperties" => {
                if let Value::Object(props) = value {
                    let normalized: Map<String, Value> = props
                        .iter()
                        .map(|(name, prop)| (name.clone(), normalize_schema(prop)))
                        .collect();
                    out.insert(key.clone(), Value::Object(normalized));
                }
            }
            "required" => {
                if let Value::Array(items) = value {
                    let names: Vec<Value> = items
                        .iter()
                        .filter(|item| item.is_string())
                        .cloned()
                        .collect();
                    out.insert(key.clone(), Value::Array(names));
                }
            }
            "type" => {
                if let Some(t) = normalize_type(value) {
                    out.insert(key.clone(), t);
                }
            }
            k if SUBSCHEMA_KEYWORDS.contains(&k) => {
                out.insert(key.clone(), normalize_schema(value));
            }
            k if SUBSCHEMA_LIST_KEYWORDS.contains(&k) => {
                if let Value::Array(items) = value {
                    out.insert(
                        key.clone(),
                        Value::Array(items.iter().map(normalize_schema).collect()),
                    );
                }
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }

    if nullable {
        apply_nullable(&mut out);
    }

    filter_required(&mut out);
    out
}

fn normalize_type(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value.clone()),
        Value::Array(items) => {
            let types: Vec<Value> = items.iter().filter(|t| t.is_string()).cloned().collect();
            if types.is_empty() {
                None
            } else {
                Some(Value::Array(types))
            }
        }
        _ => None,
    }
}

/// OpenAPI 3.0 `nullable: true` becomes a JSON-Schema type union.
fn apply_nullable(out: &mut Map<String, Value>) {
    let null = json!("null");
    match out.get_mut("type") {
        Some(Value::String(t)) => {
            let t = Value::String(t.clone());
            out.insert("type".to_string(), Value::Array(vec![t, null]));
        }
        Some(Value::Array(types)) => {
            if !types.contains(&null) {
                types.push(null);
            }
        }
        _ => {}
    }
}

/// Drops `required` entries naming properties that do not exist.
fn filter_required(out: &mut Map<String, Value>) {
    let Some(Value::Object(props)) = out.get("properties") else {
        return;
    };
    let known: Vec<String> = props.keys().cloned().collect();
    if let Some(Value::Array(required)) = out.get_mut("required") {
        required.retain(|name| {
            name.as_str()
                .map(|n| known.iter().any(|k| k == n))
                .unwrap_or(false)
        });
        let mut seen = Vec::new();
        required.retain(|name| {
            if seen.contains(name) {
                false
            } else {
                seen.push(name.clone());
                true
            }
        });
    }
}
