//! Request logging middleware

use super::super::state::ServerState;
use crate::server::metrics::record_http_request;
use axum::extract::State;
use axum::{
    body::{Body, Bytes},
    http::{
        header::{self, HeaderMap, HeaderName},
        Request, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{error, info};

#[derive(PartialEq, PartialOrd, Clone, Debug, Default, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
    Body,
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

const MAX_LOGGABLE_BODY_LENGTH: usize = 4096;

/// Credentials forwarded by MCP clients; their values never reach the log.
fn is_redacted(name: &HeaderName) -> bool {
    *name == header::AUTHORIZATION
        || *name == header::COOKIE
        || *name == header::PROXY_AUTHORIZATION
}

fn log_headers(label: &str, headers: &HeaderMap) {
    info!("  {} Headers:", label);
    for (name, value) in headers {
        if is_redacted(name) {
            info!("    {}: <redacted>", name);
        } else {
            info!("    {}: {:?}", name, value);
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/event-stream"))
        .unwrap_or(false)
}

/// Buffers a small body so it can be logged and handed back. `Err` returns
/// the body untouched; `Ok` with no bytes means reading it failed.
async fn buffer_body(
    label: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<(Body, Option<Bytes>), Body> {
    if is_event_stream(headers) {
        info!("  {} Body: event stream", label);
        return Err(body);
    }
    let size = match content_length(headers) {
        Some(size) if size <= MAX_LOGGABLE_BODY_LENGTH => size,
        Some(size) => {
            info!("  {} Body: {} bytes, not logged", label, size);
            return Err(body);
        }
        None => {
            info!("  {} Body: unknown length, not logged", label);
            return Err(body);
        }
    };
    match axum::body::to_bytes(body, size).await {
        Ok(bytes) => Ok((Body::from(bytes.clone()), Some(bytes))),
        Err(err) => {
            error!("Failed to read {} body: {:?}", label.to_lowercase(), err);
            Ok((Body::empty(), None))
        }
    }
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

pub async fn log_requests(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let level = state.config.requests_logging_level.clone();
    let start = Instant::now();

    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    if level > RequestsLoggingLevel::None {
        info!(">>> {} {}", method, request.uri());
    }
    if level >= RequestsLoggingLevel::Headers {
        log_headers("Req", request.headers());
    }

    let request = if level >= RequestsLoggingLevel::Body {
        let (parts, body) = request.into_parts();
        match buffer_body("Req", &parts.headers, body).await {
            Ok((body, Some(bytes))) => {
                info!("  Req Body:\n{}", String::from_utf8_lossy(&bytes));
                Request::from_parts(parts, body)
            }
            Ok((_, None)) => return internal_error(),
            Err(body) => Request::from_parts(parts, body),
        }
    } else {
        request
    };

    let mut response = next.run(request).await;

    if level >= RequestsLoggingLevel::Headers {
        log_headers("Resp", response.headers());
    }
    if level >= RequestsLoggingLevel::Body {
        let (parts, body) = response.into_parts();
        response = match buffer_body("Resp", &parts.headers, body).await {
            Ok((body, Some(bytes))) => {
                info!("  Resp Body:\n{}", String::from_utf8_lossy(&bytes));
                Response::from_parts(parts, body)
            }
            Ok((_, None)) => return internal_error(),
            Err(body) => Response::from_parts(parts, body),
        };
    }

    let status = response.status().as_u16();
    let duration = start.elapsed();

    if level > RequestsLoggingLevel::None {
        info!("<<< {} ({}ms)", status, duration.as_millis());
    }

    record_http_request(&method, &path, status, duration);

    response
}
