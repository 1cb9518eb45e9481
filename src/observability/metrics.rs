//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Install the Prometheus recorder once per process
//! - Record standard HTTP server metrics for every request
//! - Provide named recorders for jobs, messaging, hub and outbound clients
//!
//! # Metrics
//! - `http_requests_received_total` (counter): requests by code, method
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_requests_in_progress` (gauge): requests currently executing
//! - `httpclient_requests_sent_total` (counter): outbound calls by client, code
//! - `background_jobs_total` (counter): job executions by outcome
//! - `integration_messages_total` (counter): publish/receive by outcome
//! - `hub_connections` (gauge): open hub connections
//!
//! # Design Decisions
//! - Label names follow the Prometheus conventions used by ASP.NET exporters
//!   so existing dashboards keep working
//! - Histogram buckets tuned for typical web latencies

use std::sync::OnceLock;
use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics initialization error.
#[derive(Debug, thiserror::Error)]
#[error("failed to install metrics recorder: {0}")]
pub struct MetricsError(String);

/// Install the global recorder and return the scrape handle.
///
/// Idempotent: the recorder is process-global, so later calls return the
/// handle created by the first one.
pub fn install() -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = HANDLE.get() {
        return Ok(handle.clone());
    }

    let recorder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )
        .map_err(|e| MetricsError(e.to_string()))?
        .build_recorder();
    let handle = recorder.handle();

    match metrics::set_global_recorder(recorder) {
        Ok(()) => {
            let _ = HANDLE.set(handle.clone());
            tracing::info!("Prometheus recorder installed");
            Ok(handle)
        }
        // Lost a race against a concurrent install; use the winner's handle.
        Err(_) => HANDLE
            .get()
            .cloned()
            .ok_or_else(|| MetricsError("a foreign recorder is already installed".into())),
    }
}

/// Render the current metric set in the Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.run_upkeep();
    handle.render()
}

/// Middleware recording the standard HTTP server metrics.
pub async fn track_http(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let start = Instant::now();

    let in_progress = metrics::gauge!("http_requests_in_progress", "method" => method.clone());
    in_progress.increment(1.0);

    let response = next.run(request).await;

    in_progress.decrement(1.0);
    record_request(&method, response.status().as_u16(), start);
    response
}

/// Record a completed request.
pub fn record_request(method: &str, code: u16, start: Instant) {
    let code = code.to_string();
    metrics::counter!(
        "http_requests_received_total",
        "code" => code.clone(),
        "method" => method.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "http_request_duration_seconds",
        "code" => code,
        "method" => method.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record an outbound HTTP client call.
pub fn record_client_request(client: &'static str, code: Option<u16>, start: Instant) {
    let code = code.map_or_else(|| "error".to_string(), |c| c.to_string());
    metrics::counter!(
        "httpclient_requests_sent_total",
        "client" => client,
        "code" => code.clone()
    )
    .increment(1);
    metrics::histogram!(
        "httpclient_request_duration_seconds",
        "client" => client,
        "code" => code
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record a background job execution outcome.
pub fn record_job(job: &str, outcome: &'static str) {
    metrics::counter!(
        "background_jobs_total",
        "job" => job.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record an integration message outcome.
///
/// `direction` is `published` or `received`.
pub fn record_message(direction: &'static str, name: &str, outcome: &'static str) {
    metrics::counter!(
        "integration_messages_total",
        "direction" => direction,
        "name" => name.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Track open hub connections.
pub fn record_hub_connections(delta: f64) {
    metrics::gauge!("hub_connections").increment(delta);
}

/// Track the status of a dependency probe (1 = healthy, 0 = unhealthy).
pub fn record_dependency_health(name: &str, healthy: bool) {
    metrics::gauge!("dependency_health", "name" => name.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
