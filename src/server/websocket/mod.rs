//! WebSocket transport for MCP.
//!
//! Each connection carries JSON-RPC envelopes both ways plus unsolicited
//! notifications from the engine.

pub mod handler;

pub use handler::mcp_ws_handler;
