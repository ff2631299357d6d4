//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestClient, TestServer};
//!
//! #[tokio::test]
//! async fn test_ping() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let response = client.rpc("ping", None).await;
//!     assert!(response["result"].is_object());
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
pub use client::{connect_ws, wait_for_notification, ws_request, TestClient, WsStream};
pub use constants::*;
pub use server::{http_bridge_config, TestServer};

#[allow(unused_imports)]
pub use fixtures::{test_prompts, test_resources, test_routes, UserLookup};
