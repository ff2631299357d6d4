use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all gateway metrics
const PREFIX: &str = "mcp_gateway";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // JSON-RPC Metrics
    pub static ref RPC_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_rpc_requests_total"), "JSON-RPC requests by method and outcome"),
        &["method", "outcome"]
    ).expect("Failed to create rpc_requests_total metric");

    pub static ref RPC_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_rpc_request_duration_seconds"),
            "JSON-RPC request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method"]
    ).expect("Failed to create rpc_request_duration_seconds metric");

    // Bridge Metrics
    pub static ref BRIDGE_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_bridge_calls_total"), "Upstream calls by bridge and outcome"),
        &["server", "outcome"]
    ).expect("Failed to create bridge_calls_total metric");

    // Connection Metrics
    pub static ref CONNECTED_CLIENTS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_connected_clients"), "Notification sinks by transport"),
        &["transport"]
    ).expect("Failed to create connected_clients metric");

    pub static ref NOTIFICATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_notifications_total"), "Notification deliveries by outcome"),
        &["method", "outcome"]
    ).expect("Failed to create notifications_total metric");
}

/// Register all metrics with the Prometheus registry
pub fn init_metrics() {
    // Already-registered errors are expected when tests call this repeatedly
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(RPC_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RPC_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BRIDGE_CALLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CONNECTED_CLIENTS.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record one dispatched JSON-RPC request
pub fn record_rpc_request(method: &str, ok: bool, duration: Duration) {
    let outcome = if ok { "ok" } else { "error" };
    RPC_REQUESTS_TOTAL
        .with_label_values(&[method, outcome])
        .inc();

    RPC_REQUEST_DURATION_SECONDS
        .with_label_values(&[method])
        .observe(duration.as_secs_f64());
}

/// Record one call against an upstream bridge. `outcome` is one of `ok`,
/// `rejected`, `timeout` or `failed`.
pub fn record_bridge_call(server: &str, outcome: &str) {
    BRIDGE_CALLS_TOTAL
        .with_label_values(&[server, outcome])
        .inc();
}

pub fn set_connected_clients(transport: &str, count: usize) {
    CONNECTED_CLIENTS
        .with_label_values(&[transport])
        .set(count as f64);
}

pub fn record_notifications(method: &str, delivered: usize, dropped: usize) {
    NOTIFICATIONS_TOTAL
        .with_label_values(&[method, "delivered"])
        .inc_by(delivered as f64);
    NOTIFICATIONS_TOTAL
        .with_label_values(&[method, "dropped"])
        .inc_by(dropped as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
