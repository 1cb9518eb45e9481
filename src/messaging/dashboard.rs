//! `/cap` dashboard: message outcomes and manual requeue.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::messaging::monitor::{MessageMonitor, MessageStatus, MonitorStats};
use crate::messaging::publisher::IntegrationEventPublisher;

#[derive(Clone)]
pub struct CapDashboard {
    pub monitor: Arc<MessageMonitor>,
    pub publisher: IntegrationEventPublisher,
    pub subscriptions: Arc<Vec<(String, Vec<String>)>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    transport: &'static str,
    #[serde(flatten)]
    stats: MonitorStats,
    subscriptions: usize,
}

#[derive(Deserialize)]
struct StatusFilter {
    status: Option<String>,
}

pub fn router(dashboard: CapDashboard) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/stats", get(stats))
        .route("/api/published", get(published))
        .route("/api/published/requeue", post(requeue))
        .route("/api/received", get(received))
        .route("/api/subscriptions", get(subscriptions))
        .with_state(dashboard)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn stats(State(d): State<CapDashboard>) -> Json<StatsResponse> {
    Json(StatsResponse {
        transport: d.publisher.transport(),
        stats: d.monitor.stats(),
        subscriptions: d.subscriptions.len(),
    })
}

fn parse_status(filter: StatusFilter) -> Result<Option<MessageStatus>, Response> {
    filter
        .status
        .map(|s| s.parse::<MessageStatus>())
        .transpose()
        .map_err(|e| (StatusCode::BAD_REQUEST, e).into_response())
}

async fn published(State(d): State<CapDashboard>, Query(filter): Query<StatusFilter>) -> Response {
    match parse_status(filter) {
        Ok(status) => Json(d.monitor.published(status)).into_response(),
        Err(rejection) => rejection,
    }
}

async fn received(State(d): State<CapDashboard>, Query(filter): Query<StatusFilter>) -> Response {
    match parse_status(filter) {
        Ok(status) => Json(d.monitor.received(status)).into_response(),
        Err(rejection) => rejection,
    }
}

async fn requeue(State(d): State<CapDashboard>) -> Json<serde_json::Value> {
    let recovered = d.publisher.retry_failed().await;
    Json(serde_json::json!({ "requeued": recovered }))
}

async fn subscriptions(State(d): State<CapDashboard>) -> Json<serde_json::Value> {
    let body: Vec<_> = d
        .subscriptions
        .iter()
        .map(|(topic, handlers)| serde_json::json!({ "topic": topic, "handlers": handlers }))
        .collect();
    Json(serde_json::Value::Array(body))
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>CAP Dashboard</title></head>
<body>
<h1>CAP Dashboard</h1>
<pre id="stats">loading...</pre>
<h2>Failed published messages</h2>
<button onclick="requeue()">Requeue failed</button>
<pre id="failed"></pre>
<script>
async function load() {
  const base = location.pathname.replace(/\/$/, '');
  document.getElementById('stats').textContent =
    JSON.stringify(await (await fetch(base + '/api/stats')).json(), null, 2);
  document.getElementById('failed').textContent =
    JSON.stringify(await (await fetch(base + '/api/published?status=failed')).json(), null, 2);
}
async function requeue() {
  const base = location.pathname.replace(/\/$/, '');
  await fetch(base + '/api/published/requeue', { method: 'POST' });
  load();
}
load();
</script>
</body>
</html>
"#;
