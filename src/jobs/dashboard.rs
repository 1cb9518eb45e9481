//! `/hangfire` dashboard.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::jobs::runner::{JobRunner, JobState};

#[derive(Deserialize)]
struct StateFilter {
    state: Option<String>,
}

pub fn router(runner: JobRunner) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/stats", get(stats))
        .route("/api/jobs", get(jobs))
        .route("/api/jobs/{id}", get(job))
        .route("/api/recurring", get(recurring))
        .route("/api/recurring/{id}/trigger", post(trigger))
        .with_state(runner)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn stats(State(runner): State<JobRunner>) -> Response {
    Json(runner.stats()).into_response()
}

async fn jobs(State(runner): State<JobRunner>, Query(filter): Query<StateFilter>) -> Response {
    let state = match filter.state.map(|s| s.parse::<JobState>()).transpose() {
        Ok(state) => state,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    Json(runner.jobs(state)).into_response()
}

async fn job(State(runner): State<JobRunner>, Path(id): Path<uuid::Uuid>) -> Response {
    match runner.job(id) {
        Some(record) => Json(record).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn recurring(State(runner): State<JobRunner>) -> Response {
    Json(runner.recurring()).into_response()
}

async fn trigger(State(runner): State<JobRunner>, Path(id): Path<String>) -> Response {
    match runner.trigger(&id) {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "jobId": job_id })),
        )
            .into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Hangfire Dashboard</title></head>
<body>
<h1>Hangfire Dashboard</h1>
<pre id="stats">loading...</pre>
<h2>Recurring jobs</h2>
<div id="recurring"></div>
<h2>Failed jobs</h2>
<pre id="failed"></pre>
<script>
const base = location.pathname.replace(/\/$/, '');
async function trigger(id) {
  await fetch(base + '/api/recurring/' + encodeURIComponent(id) + '/trigger', { method: 'POST' });
  load();
}
async function load() {
  document.getElementById('stats').textContent =
    JSON.stringify(await (await fetch(base + '/api/stats')).json(), null, 2);
  const recurring = await (await fetch(base + '/api/recurring')).json();
  const list = document.getElementById('recurring');
  list.innerHTML = '';
  for (const r of recurring) {
    const row = document.createElement('div');
    row.textContent = r.id + ' every ' + r.intervalSecs + 's, next ' + r.nextRun + ' ';
    const button = document.createElement('button');
    button.textContent = 'Trigger now';
    button.onclick = () => trigger(r.id);
    row.appendChild(button);
    list.appendChild(row);
  }
  document.getElementById('failed').textContent =
    JSON.stringify(await (await fetch(base + '/api/jobs?state=failed')).json(), null, 2);
}
load();
</script>
</body>
</html>
"#;
