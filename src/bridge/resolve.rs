//! Tool-call resolution across bridges.
//!
//! Clients call bridged tools by the name they saw in `tools/list`, but
//! callers also guess names (an agent told about "click" on server "alpha"
//! may ask for `click`, `alpha_click`, ...). Resolution order:
//!
//! 1. the recorded target from the last aggregated listing,
//! 2. every bridge in name order, trying the name variations below; a bridge
//!    whose listing is known is only asked for names it advertises.
//!
//! An upstream RPC error moves on to the next variation; a transport failure
//! or timeout moves on to the next bridge. When nothing accepts the call, the
//! first rejection that was not about an unknown tool name is returned, so an
//! upstream's argument validation reaches the caller.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use super::client::BridgeClient;
use super::error::BridgeError;
use crate::mcp::protocol::methods;

/// Where a bridged tool lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRoute {
    pub server: String,
    pub original_name: String,
}

/// Name guesses for `name` on `server`, in the order they are tried.
pub fn name_variations(name: &str, server: &str) -> Vec<String> {
    let candidates = [
        name.to_string(),
        format!("{}_{}", server, name),
        format!("mcp_{}", name),
        format!("{}_{}", name, server),
    ];
    let mut out: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

/// A bridge plus what it last advertised, if known.
pub struct Candidate<'a> {
    pub client: &'a Arc<BridgeClient>,
    pub advertised: Option<&'a HashSet<String>>,
}

/// Outcome of a resolution attempt.
#[derive(Debug)]
pub enum Resolution {
    /// A bridge accepted the call; the result is passed through unchanged.
    Called {
        server: String,
        tool: String,
        result: Value,
    },
    /// A bridge knew the tool but rejected the call, and nothing else matched.
    Rejected(BridgeError),
    NotFound,
}

async fn call(
    client: &BridgeClient,
    tool: &str,
    arguments: &Value,
    timeout: Duration,
) -> Result<Value, BridgeError> {
    client
        .rpc_request(
            methods::TOOLS_CALL,
            Some(json!({ "name": tool, "arguments": arguments })),
            timeout,
        )
        .await
}

pub async fn resolve_tool_call(
    candidates: &[Candidate<'_>],
    hint: Option<&ToolRoute>,
    name: &str,
    arguments: &Value,
    timeout: Duration,
) -> Resolution {
    let mut rejected: Option<BridgeError> = None;

    if let Some(hint) = hint {
        if let Some(candidate) = candidates
            .iter()
            .find(|c| c.client.name() == hint.server)
        {
            match call(candidate.client, &hint.original_name, arguments, timeout).await {
                Ok(result) => {
                    return Resolution::Called {
                        server: hint.server.clone(),
                        tool: hint.original_name.clone(),
                        result,
                    }
                }
                Err(e) => {
                    debug!(
                        "Recorded target {}/{} failed: {}",
                        hint.server, hint.original_name, e
                    );
                    if e.is_rpc() {
                        rejected = Some(e);
                    }
                }
            }
        }
    }

    for candidate in candidates {
        let server = candidate.client.name();
        for variation in name_variations(name, server) {
            if let Some(hint) = hint {
                if hint.server == server && hint.original_name == variation {
                    continue;
                }
            }
            if let Some(advertised) = candidate.advertised {
                if !advertised.contains(&variation) {
                    continue;
                }
            }

            match call(candidate.client, &variation, arguments, timeout).await {
                Ok(result) => {
                    debug!("Resolved {} to {}/{}", name, server, variation);
                    return Resolution::Called {
                        server: server.to_string(),
                        tool: variation,
                        result,
                    };
                }
                Err(e) if e.is_rpc() => {
                    debug!("{}/{} rejected: {}", server, variation, e);
                    if candidate.advertised.is_some() || !e.is_unknown_tool() {
                        rejected.get_or_insert(e);
                    }
                }
                Err(e) => {
                    debug!("Bridge {} unavailable for {}: {}", server, name, e);
                    break;
                }
            }
        }
    }

    match rejected {
        Some(e) => Resolution::Rejected(e),
        None => Resolution::NotFound,
    }
}
