//! MCP Gateway Library
//!
//! This library exposes the internal modules for testing and embedding: the
//! protocol engine, the bridge subsystem and the client-facing transports.

pub mod bridge;
pub mod config;
pub mod mcp;
pub mod server;

// Re-export commonly used types for convenience
pub use bridge::{BridgeManager, DefaultTransportFactory};
pub use mcp::McpEngine;
pub use server::{make_app, run_server, serve_stdio, RequestsLoggingLevel, ServerConfig};
