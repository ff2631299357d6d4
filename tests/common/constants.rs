//! Shared constants for end-to-end tests
//!
//! When fixture data changes (route paths, prompt names, resource URIs),
//! update only this file.
#![allow(dead_code)]

// ============================================================================
// Timing
// ============================================================================

/// Maximum time to wait for a spawned server to answer `/health`
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Delay between readiness polls
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// Per-request timeout of the test HTTP client
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Upstream call timeout used by gateways that bridge other servers
pub const BRIDGE_TIMEOUT_MS: u64 = 1500;

/// How long tests wait for a notification to show up
pub const NOTIFICATION_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Fixture catalog
// ============================================================================

/// Tool generated for `GET /users/:id`
pub const USER_TOOL: &str = "get_users_by_id";

/// Tool generated for `POST /echo`
pub const ECHO_TOOL: &str = "post_echo";

/// Prompt with a required `topic` argument
pub const SUMMARY_PROMPT: &str = "summarize";

/// Static text resource
pub const README_URI: &str = "docs://readme";

/// Dynamic resource template
pub const USER_RESOURCE_TEMPLATE: &str = "users://{id}/profile";

/// Name every bridging test gives its upstream
pub const UPSTREAM_NAME: &str = "alpha";
