//! `resources/list`, `resources/templates/list` and `resources/read`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::prelude::*;
use serde_json::Value;
use tracing::debug;

use super::{decode_listing, parse_params, to_result};
use crate::bridge::BridgeManager;
use crate::mcp::catalog::CatalogStore;
use crate::mcp::protocol::{
    McpError, ResourceContent, ResourceListing, ResourceTemplateListing, ResourceTemplatesListResult,
    ResourcesListResult, ResourcesReadParams, ResourcesReadResult,
};
use crate::mcp::registry::{ResourceBody, ResourceData, ResourceDefinition};
use crate::mcp::routes::RouteError;

pub struct ResourceProcessor {
    catalog: Arc<CatalogStore>,
    bridges: Option<Arc<BridgeManager>>,
}

impl ResourceProcessor {
    pub fn new(catalog: Arc<CatalogStore>, bridges: Option<Arc<BridgeManager>>) -> Self {
        Self { catalog, bridges }
    }

    pub async fn list(&self) -> Result<Value, McpError> {
        let snapshot = self.catalog.snapshot();
        let mut resources: Vec<ResourceListing> =
            snapshot.static_resources().map(|r| r.to_listing()).collect();

        if let Some(bridges) = &self.bridges {
            let reserved: HashSet<String> = resources.iter().map(|r| r.uri.clone()).collect();
            resources.extend(decode_listing::<ResourceListing>(
                bridges.list_resources(&reserved).await,
            ));
        }

        to_result(ResourcesListResult { resources })
    }

    pub async fn list_templates(&self) -> Result<Value, McpError> {
        let snapshot = self.catalog.snapshot();
        let mut resource_templates: Vec<ResourceTemplateListing> = snapshot
            .resource_templates()
            .map(|r| r.to_template_listing())
            .collect();

        if let Some(bridges) = &self.bridges {
            let reserved: HashSet<String> = resource_templates
                .iter()
                .map(|t| t.uri_template.clone())
                .collect();
            resource_templates.extend(decode_listing::<ResourceTemplateListing>(
                bridges.list_resource_templates(&reserved).await,
            ));
        }

        to_result(ResourceTemplatesListResult { resource_templates })
    }

    pub async fn read(&self, params: Option<Value>) -> Result<Value, McpError> {
        let params: ResourcesReadParams = parse_params(params)?;

        let snapshot = self.catalog.snapshot();
        if let Some((resource, variables)) = snapshot.find_resource(&params.uri) {
            let content = read_local(resource, &params.uri, variables).await?;
            return to_result(ResourcesReadResult {
                contents: vec![content],
            });
        }

        if let Some(bridges) = &self.bridges {
            match bridges.read_resource(&params.uri).await {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => debug!("No bridge serves resource {}", params.uri),
                Err(e) => return Err(e.into()),
            }
        }

        Err(McpError::ResourceNotFound(params.uri))
    }
}

async fn read_local(
    resource: &ResourceDefinition,
    uri: &str,
    variables: HashMap<String, String>,
) -> Result<ResourceContent, McpError> {
    let data = match &resource.body {
        ResourceBody::Text(text) => ResourceData::Text(text.clone()),
        ResourceBody::Blob(bytes) => ResourceData::Blob(bytes.clone()),
        ResourceBody::Dynamic(reader) => {
            reader(uri.to_string(), variables)
                .await
                .map_err(|e| match e {
                    RouteError::InvalidInput(message) => McpError::InvalidParams(message),
                    RouteError::Failed(message) => McpError::InternalError(message),
                })?
        }
    };

    let mime_type = resource.mime_type.clone();
    Ok(match data {
        ResourceData::Text(text) => ResourceContent::Text {
            uri: uri.to_string(),
            mime_type,
            text: render_text(resource.format.as_deref(), text),
        },
        ResourceData::Blob(bytes) => ResourceContent::Blob {
            uri: uri.to_string(),
            mime_type,
            blob: BASE64_STANDARD.encode(bytes),
        },
    })
}

/// Pretty-prints text of resources declared with the `json` format.
fn render_text(format: Option<&str>, text: String) -> String {
    if format != Some("json") {
        return text;
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or(text),
        Err(_) => text,
    }
}

/// Renders `value` as pretty JSON text for a resource reader.
pub fn json_resource(value: &Value) -> ResourceData {
    ResourceData::Text(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
}
