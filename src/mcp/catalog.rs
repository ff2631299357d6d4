//! Local catalog snapshots.
//!
//! A [`CatalogSnapshot`] is an immutable view of the local tools, prompts and
//! resources. Every change builds a new snapshot and swaps it in; readers take
//! one `Arc` per operation and never see a half-applied reload.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use super::registry::{match_uri_pattern, PromptDefinition, RegisteredTool, ResourceDefinition};
use super::routes::RouteDefinition;
use super::tool_builder::build_tool;

#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    tools: Vec<RegisteredTool>,
    tool_index: HashMap<String, usize>,
    prompts: Vec<PromptDefinition>,
    resources: Vec<ResourceDefinition>,
}

impl CatalogSnapshot {
    pub fn build(
        routes: &[RouteDefinition],
        prompts: Vec<PromptDefinition>,
        resources: Vec<ResourceDefinition>,
    ) -> Self {
        let mut tools = Vec::with_capacity(routes.len());
        let mut tool_index = HashMap::with_capacity(routes.len());

        for route in routes {
            let tool = build_tool(route);
            if tool_index.contains_key(&tool.name) {
                warn!(
                    "Duplicate tool name {} for {} {}, keeping the first route",
                    tool.name, route.method, route.path
                );
                continue;
            }
            tool_index.insert(tool.name.clone(), tools.len());
            tools.push(RegisteredTool {
                tool,
                processor: route.processor.clone(),
            });
        }

        Self {
            tools,
            tool_index,
            prompts: dedup_by(prompts, |p| p.name.clone(), "prompt"),
            resources: dedup_by(resources, |r| r.uri.clone(), "resource"),
        }
    }

    pub fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    pub fn tool(&self, name: &str) -> Option<&RegisteredTool> {
        self.tool_index.get(name).map(|i| &self.tools[*i])
    }

    pub fn prompts(&self) -> &[PromptDefinition] {
        &self.prompts
    }

    pub fn prompt(&self, name: &str) -> Option<&PromptDefinition> {
        self.prompts.iter().find(|p| p.name == name)
    }

    pub fn resources(&self) -> &[ResourceDefinition] {
        &self.resources
    }

    /// Concrete (non-template) resources.
    pub fn static_resources(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.resources.iter().filter(|r| !r.is_template())
    }

    pub fn resource_templates(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.resources.iter().filter(|r| r.is_template())
    }

    /// Exact URI match first, then the first template that matches.
    pub fn find_resource(
        &self,
        uri: &str,
    ) -> Option<(&ResourceDefinition, HashMap<String, String>)> {
        if let Some(resource) = self.static_resources().find(|r| r.uri == uri) {
            return Some((resource, HashMap::new()));
        }
        self.resource_templates()
            .find_map(|r| match_uri_pattern(&r.uri, uri).map(|params| (r, params)))
    }
}

fn dedup_by<T>(items: Vec<T>, key: impl Fn(&T) -> String, kind: &str) -> Vec<T> {
    let mut seen = Vec::with_capacity(items.len());
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let k = key(&item);
        if seen.contains(&k) {
            warn!("Duplicate {} {}, keeping the first definition", kind, k);
            continue;
        }
        seen.push(k);
        out.push(item);
    }
    out
}

/// Holds the current snapshot plus the inputs it was built from, so each
/// setter can rebuild with only its own part replaced.
pub struct CatalogStore {
    current: RwLock<Arc<CatalogSnapshot>>,
    sources: RwLock<CatalogSources>,
}

#[derive(Default, Clone)]
struct CatalogSources {
    routes: Vec<RouteDefinition>,
    prompts: Vec<PromptDefinition>,
    resources: Vec<ResourceDefinition>,
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CatalogSnapshot::default())),
            sources: RwLock::new(CatalogSources::default()),
        }
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(
        &self,
        routes: Option<Vec<RouteDefinition>>,
        prompts: Option<Vec<PromptDefinition>>,
        resources: Option<Vec<ResourceDefinition>>,
    ) -> Arc<CatalogSnapshot> {
        let mut sources = match self.sources.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(routes) = routes {
            sources.routes = routes;
        }
        if let Some(prompts) = prompts {
            sources.prompts = prompts;
        }
        if let Some(resources) = resources {
            sources.resources = resources;
        }

        let snapshot = Arc::new(CatalogSnapshot::build(
            &sources.routes,
            sources.prompts.clone(),
            sources.resources.clone(),
        ));
        info!(
            "Catalog rebuilt: {} tools, {} prompts, {} resources",
            snapshot.tools.len(),
            snapshot.prompts.len(),
            snapshot.resources.len()
        );

        match self.current.write() {
            Ok(mut guard) => *guard = snapshot.clone(),
            Err(poisoned) => *poisoned.into_inner() = snapshot.clone(),
        }
        snapshot
    }
}
