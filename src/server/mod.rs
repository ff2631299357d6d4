pub mod config;
mod http_layers;
pub mod http;
pub mod metrics;
pub mod server;
pub mod state;
pub mod stdio;
pub mod websocket;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use stdio::serve_stdio;
