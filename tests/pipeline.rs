//! End-to-end tests of the assembled middleware pipeline.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use service_host::config::Environment;

mod common;

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8_lossy(&body).into_owned())
}

#[tokio::test]
async fn test_health_is_healthy_without_dependencies() {
    let host = common::build_host(common::test_config()).await;
    let app = common::router_from(&host, "127.0.0.1:40000");

    let (status, _, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Healthy");
}

#[tokio::test]
async fn test_metrics_count_requests() {
    let host = common::build_host(common::test_config()).await;
    let app = common::router_from(&host, "127.0.0.1:40000");

    get(&app, "/health").await;
    let (status, _, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("http_requests_received_total"));
}

#[tokio::test]
async fn test_request_id_generated_and_propagated() {
    let host = common::build_host(common::test_config()).await;
    let app = common::router_from(&host, "127.0.0.1:40000");

    let (_, headers, _) = get(&app, "/health").await;
    assert!(headers.contains_key("x-request-id"));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn test_api_docs_only_in_development() {
    let host = common::build_host(common::test_config()).await;
    let app = common::router_from(&host, "127.0.0.1:40000");
    let (status, _, body) = get(&app, "/swagger/v1/swagger.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("/api/orders"));

    let mut config = common::test_config();
    config.env.name = Environment::Production;
    let host = common::build_host(config).await;
    let app = common::router_from(&host, "127.0.0.1:40000");
    let (status, _, _) = get(&app, "/swagger/v1/swagger.json").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_static_files_are_the_fallback() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();

    let mut config = common::test_config();
    config.server.static_files_dir = dir.path().to_string_lossy().into_owned();
    let host = common::build_host(config).await;
    let app = common::router_from(&host, "127.0.0.1:40000");

    let (status, _, body) = get(&app, "/index.html").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<h1>home</h1>");

    let (status, _, _) = get(&app, "/missing.css").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dashboards_reachable_locally() {
    let host = common::build_host(common::test_config()).await;
    host.start_background();
    let app = common::router_from(&host, "127.0.0.1:40000");

    let (status, _, body) = get(&app, "/hangfire").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Hangfire"));

    let (status, _, body) = get(&app, "/hangfire/api/recurring").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("cap-failed-retry"));

    let (status, _, _) = get(&app, "/cap").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = get(&app, "/cap/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("in-memory"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hangfire/api/recurring/cap-failed-retry/trigger")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    host.services().shutdown.trigger();
}

#[tokio::test]
async fn test_dashboards_reject_remote_peers() {
    let host = common::build_host(common::test_config()).await;
    let app = common::router_from(&host, "203.0.113.7:40000");

    let (status, headers, _) = get(&app, "/hangfire/api/stats").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(headers[header::CONTENT_TYPE], "application/problem+json");

    let (status, _, _) = get(&app, "/cap/api/stats").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Public endpoints are unaffected.
    let (status, _, _) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_https_redirect_when_port_configured() {
    let mut config = common::test_config();
    config.server.https_port = Some(5001);
    let host = common::build_host(config).await;
    let app = common::router_from(&host, "127.0.0.1:40000");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/orders")
                .header(header::HOST, "localhost:5000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://localhost:5001/api/orders"
    );
}

#[tokio::test]
async fn test_docs_and_static_files_answer_before_https_redirect() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();

    let mut config = common::test_config();
    config.server.https_port = Some(5001);
    config.server.static_files_dir = dir.path().to_string_lossy().into_owned();
    let host = common::build_host(config).await;
    let app = common::router_from(&host, "127.0.0.1:40000");

    let (status, _, body) = get(&app, "/index.html").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<h1>home</h1>");

    let (status, _, _) = get(&app, "/swagger/v1/swagger.json").await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::HOST, "localhost:5000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://localhost:5001/health"
    );
}

#[tokio::test]
async fn test_orders_round_trip_publishes_event() {
    let host = common::build_host(common::test_config()).await;
    let app = common::router_from(&host, "127.0.0.1:40000");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/orders")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name":"espresso","count":3}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key(header::LOCATION));

    let (status, _, body) = get(&app, "/cap/api/published").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("orders.created"));
}

#[tokio::test]
async fn test_validation_errors_are_problem_json() {
    let host = common::build_host(common::test_config()).await;
    let app = common::router_from(&host, "127.0.0.1:40000");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/orders")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name":"","count":0}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/problem+json"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let problem: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(problem["errors"]["name"].is_array());
}
