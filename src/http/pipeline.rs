//! Middleware pipeline assembly.
//!
//! Outermost first:
//! ```text
//! CatchPanicLayer        panics → 500 problem+json
//! SetRequestId / Trace   x-request-id generated or propagated, request span
//! TimeoutLayer           server.request_timeout_secs
//! track_http             http_requests_* metrics
//! /swagger*              (development only)
//! fallback               static files from server.static_files_dir
//! HTTPS redirection      307 to server.https_port, routed endpoints only
//! routes
//!   /api/*               controllers
//!   /chat                hub
//!   /metrics             Prometheus scrape
//!   /health              probes
//!   /hangfire, /cap      dashboards, local-only when configured
//! ```
//!
//! API documentation and static files answer before the redirect, so they
//! stay reachable over plain HTTP.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::routing::get;
use axum::{middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::application::{controllers, ApiState};
use crate::bootstrap::AppServices;
use crate::http::authorization::dashboard;
use crate::http::error::panic_response;
use crate::http::https::{self, HttpsRedirect};
use crate::http::docs;
use crate::messaging::CapDashboard;
use crate::observability::metrics;
use crate::{health, hub, jobs, messaging};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Build the complete application router.
#[allow(deprecated)]
pub fn build(services: &AppServices) -> Router {
    let config = &services.config;
    let development = config.env.is_development();

    let mut routed = Router::new()
        .merge(controllers::router(ApiState {
            mediator: services.mediator.clone(),
            users: services.users.clone(),
        }))
        .merge(hub::router(services.hub.clone()))
        .merge(health::router(services.health.clone()));

    if let Some(handle) = services.metrics.clone() {
        routed = routed.merge(metrics_router(handle));
    }

    let cap = CapDashboard {
        monitor: services.monitor.clone(),
        publisher: services.publisher.clone(),
        subscriptions: std::sync::Arc::new(services.subscribers.subscriptions()),
    };
    let routed = routed
        .nest(
            "/hangfire",
            dashboard(jobs::dashboard::router(services.jobs.clone()), config.jobs.dashboard_local_only),
        )
        .nest(
            "/cap",
            dashboard(messaging::dashboard::router(cap), config.messaging.dashboard_local_only),
        )
        .route_layer(middleware::from_fn_with_state(
            HttpsRedirect::new(config.server.https_port),
            https::redirect,
        ));

    let mut app = Router::new();
    if development {
        app = app.merge(docs::router());
    }
    let app = app
        .merge(routed)
        .fallback_service(ServeDir::new(&config.server.static_files_dir));

    let request_id = HeaderName::from_static(X_REQUEST_ID);
    app.layer(middleware::from_fn(metrics::track_http))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(move |err| panic_response(err, development)))
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get(X_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs))),
        )
}

fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { metrics::render(&handle) }
        }),
    )
}
