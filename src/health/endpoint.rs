//! `GET /health`.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::health::checks::HealthRegistry;

#[derive(Debug, Default, Deserialize)]
struct HealthQuery {
    detail: Option<String>,
}

impl HealthQuery {
    /// `true`/`1`/`yes`, case-insensitive; anything else is plain text.
    fn wants_detail(&self) -> bool {
        self.detail.as_deref().is_some_and(|v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
        })
    }
}

pub fn router(registry: Arc<HealthRegistry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(registry)
}

async fn health(
    State(registry): State<Arc<HealthRegistry>>,
    Query(query): Query<HealthQuery>,
    headers: HeaderMap,
) -> Response {
    let report = registry.run().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    if query.wants_detail() || wants_json(&headers) {
        (status, Json(report)).into_response()
    } else {
        (status, report.status).into_response()
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::checks::tests::StaticCheck;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn call(registry: HealthRegistry, uri: &str, accept: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().uri(uri);
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }
        let response = router(Arc::new(registry))
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_healthy_plain_text() {
        let registry =
            HealthRegistry::default().with_check(StaticCheck { name: "redis", healthy: true });
        let (status, body) = call(registry, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Healthy");
    }

    #[tokio::test]
    async fn test_unhealthy_returns_503() {
        let registry = HealthRegistry::default()
            .with_check(StaticCheck { name: "redis", healthy: true })
            .with_check(StaticCheck { name: "mysql", healthy: false });
        let (status, body) = call(registry, "/health", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "Unhealthy");
    }

    #[tokio::test]
    async fn test_detail_report() {
        let registry =
            HealthRegistry::default().with_check(StaticCheck { name: "mysql", healthy: false });
        let (_, body) = call(registry, "/health?detail=true", None).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "Unhealthy");
        assert_eq!(json["checks"]["mysql"]["reason"], "down");
    }

    #[tokio::test]
    async fn test_detail_flag_is_lenient() {
        let healthy = || HealthRegistry::default().with_check(StaticCheck { name: "redis", healthy: true });

        let (status, body) = call(healthy(), "/health?detail=1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with('{'));

        let (status, body) = call(healthy(), "/health?detail=maybe", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Healthy");

        let (status, body) = call(healthy(), "/health?detail", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Healthy");
    }

    #[tokio::test]
    async fn test_accept_json() {
        let registry =
            HealthRegistry::default().with_check(StaticCheck { name: "redis", healthy: true });
        let (status, body) = call(registry, "/health", Some("application/json")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with('{'));
    }
}
