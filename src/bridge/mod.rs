//! Bridge subsystem: aggregates catalogs of other MCP servers and forwards
//! calls to them.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod manager;
pub mod resolve;
pub mod sse;
pub mod stdio;
pub mod transport;
pub mod watcher;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{BridgeClient, BridgeState};
pub use config::{BridgeEndpoint, BridgeServerConfig};
pub use error::BridgeError;
pub use manager::{BridgeManager, BridgeStatus, ReloadSummary};
pub use transport::{BridgeTransport, DefaultTransportFactory, TransportFactory};
pub use watcher::ConfigWatcher;

use crate::mcp::protocol::notifications;

/// Default per-call timeout against upstream servers
pub const DEFAULT_BRIDGE_TIMEOUT_MS: u64 = 10_000;

/// Which part of a catalog changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Tools,
    Prompts,
    Resources,
    All,
}

impl ChangeKind {
    /// Maps an upstream notification method, in either the MCP spelling or
    /// this engine's own, to the change it announces.
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            notifications::UPSTREAM_TOOLS_LIST_CHANGED | notifications::TOOLS_CHANGED => {
                Some(ChangeKind::Tools)
            }
            notifications::UPSTREAM_PROMPTS_LIST_CHANGED | notifications::PROMPTS_CHANGED => {
                Some(ChangeKind::Prompts)
            }
            notifications::UPSTREAM_RESOURCES_LIST_CHANGED | notifications::RESOURCES_CHANGED => {
                Some(ChangeKind::Resources)
            }
            notifications::COMPONENTS_REFRESHED => Some(ChangeKind::All),
            _ => None,
        }
    }
}

/// Things the bridge subsystem tells the engine about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// An upstream announced a catalog change.
    Changed { server: String, kind: ChangeKind },
    /// The bridge set was rebuilt from configuration.
    Reloaded { active: Vec<String> },
}
