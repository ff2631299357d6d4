//! MCP (Model Context Protocol) engine
//!
//! Serves local routes, prompts and resources, plus whatever the configured
//! bridges expose, to MCP clients over any transport.
//!
//! ## Architecture
//!
//! - Dispatcher: envelope validation and method routing
//! - Processors: tools, prompts, resources, system
//! - Catalog: immutable snapshots swapped on every reload
//! - Connections: per-client notification channels

pub mod catalog;
pub mod connections;
pub mod dispatcher;
pub mod engine;
pub mod processors;
pub mod protocol;
pub mod registry;
pub mod routes;
pub mod schema;
pub mod tool_builder;

pub use dispatcher::{DispatchOutput, Dispatcher, McpMethod};
pub use engine::McpEngine;
pub use protocol::{McpError, McpNotification, McpRequest, McpResponse};
pub use registry::{PromptDefinition, ResourceBuilder, ResourceDefinition};
pub use routes::{RouteDefinition, RouteProcessor};
