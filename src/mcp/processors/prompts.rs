//! `prompts/list` and `prompts/get`.

use std::collections::HashSet;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;

use super::{decode_listing, parse_params, to_result};
use crate::bridge::BridgeManager;
use crate::mcp::catalog::CatalogStore;
use crate::mcp::protocol::{
    McpError, PromptListing, PromptMessage, PromptMessageContent, PromptsGetParams,
    PromptsGetResult, PromptsListResult,
};
use crate::mcp::registry::PromptDefinition;

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("Invalid placeholder pattern");
}

pub struct PromptProcessor {
    catalog: Arc<CatalogStore>,
    bridges: Option<Arc<BridgeManager>>,
}

impl PromptProcessor {
    pub fn new(catalog: Arc<CatalogStore>, bridges: Option<Arc<BridgeManager>>) -> Self {
        Self { catalog, bridges }
    }

    pub async fn list(&self) -> Result<Value, McpError> {
        let snapshot = self.catalog.snapshot();
        let mut prompts: Vec<PromptListing> =
            snapshot.prompts().iter().map(|p| p.to_listing()).collect();

        if let Some(bridges) = &self.bridges {
            let reserved: HashSet<String> =
                snapshot.prompts().iter().map(|p| p.name.clone()).collect();
            prompts.extend(decode_listing::<PromptListing>(
                bridges.list_prompts(&reserved).await,
            ));
        }

        to_result(PromptsListResult { prompts })
    }

    pub async fn get(&self, params: Option<Value>) -> Result<Value, McpError> {
        let params: PromptsGetParams = parse_params(params)?;

        let snapshot = self.catalog.snapshot();
        if let Some(prompt) = snapshot.prompt(&params.name) {
            let arguments = params.arguments.unwrap_or_default();
            return to_result(render_prompt(prompt, &arguments)?);
        }

        if let Some(bridges) = &self.bridges {
            match bridges
                .get_prompt(&params.name, params.arguments.map(Value::Object))
                .await
            {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => debug!("No bridge serves prompt {}", params.name),
                Err(e) => return Err(e.into()),
            }
        }

        Err(McpError::PromptNotFound(params.name))
    }
}

/// Fills the template with `arguments`.
///
/// Declared arguments that were not supplied render as empty text;
/// placeholders that are not declared at all are left in place.
pub fn render_prompt(
    prompt: &PromptDefinition,
    arguments: &Map<String, Value>,
) -> Result<PromptsGetResult, McpError> {
    let declared = prompt.argument_list();

    if let Some(missing) = declared
        .iter()
        .filter(|a| a.required)
        .find(|a| arguments.get(&a.name).map_or(true, Value::is_null))
    {
        return Err(McpError::InvalidParams(format!(
            "Missing required argument: {}",
            missing.name
        )));
    }

    let rendered = PLACEHOLDER.replace_all(&prompt.template, |caps: &Captures| {
        let name = &caps[1];
        match arguments.get(name) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None if declared.iter().any(|a| a.name == name) => String::new(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        }
    });

    let text = match prompt.instructions.as_deref() {
        Some(instructions) if !instructions.is_empty() => {
            format!("{}\n\n{}", instructions, rendered)
        }
        _ => rendered.into_owned(),
    };

    Ok(PromptsGetResult {
        description: prompt.description.clone(),
        messages: vec![PromptMessage {
            role: "user".to_string(),
            content: PromptMessageContent::Text { text },
        }],
    })
}
