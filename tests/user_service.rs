//! Typed user-service client against a mock backend.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use service_host::clients::{ClientError, UserId, UserServiceClient};
use service_host::config::UserServiceConfig;

mod common;

const KNOWN: &str = "6f1c1d1e-2b7a-4c1e-9a55-0d2c6f5e8a11";

async fn user_backend() -> std::net::SocketAddr {
    common::start_programmable_backend(|request_line| async move {
        if request_line.contains(&format!("/api/users/{KNOWN}")) {
            (
                200,
                format!(r#"{{"id":"{KNOWN}","name":"Ada","email":"ada@example.com"}}"#),
            )
        } else if request_line.contains("/api/users/") {
            (404, String::new())
        } else {
            (500, r#"{"error":"boom"}"#.to_string())
        }
    })
    .await
}

fn client(base_url: String) -> UserServiceClient {
    UserServiceClient::new(&UserServiceConfig {
        base_url,
        timeout_secs: 2,
    })
    .unwrap()
}

#[tokio::test]
async fn test_get_user_found_and_missing() {
    let addr = user_backend().await;
    let client = client(format!("http://{addr}"));

    let user = client.get_user(KNOWN.parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(user.name, "Ada");
    assert_eq!(user.id.to_string(), KNOWN);

    assert!(client.get_user(UserId::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let addr = common::start_programmable_backend(|_| async { (500, "{}".to_string()) }).await;
    let client = client(format!("http://{addr}"));

    let err = client.get_user(UserId::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::Status(s) if s == StatusCode::INTERNAL_SERVER_ERROR));
}

#[tokio::test]
async fn test_users_controller_proxies() {
    let addr = user_backend().await;
    let mut config = common::test_config();
    config.user_service.base_url = format!("http://{addr}");
    let host = common::build_host(config).await;
    let app = common::router_from(&host, "127.0.0.1:40000");

    let status = |uri: String| {
        let app = app.clone();
        async move {
            app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap()
                .status()
        }
    };

    assert_eq!(status(format!("/api/users/{KNOWN}")).await, StatusCode::OK);
    assert_eq!(
        status(format!("/api/users/{}", UserId::new())).await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_unreachable_user_service_is_bad_gateway() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let mut config = common::test_config();
    config.user_service.base_url = format!("http://127.0.0.1:{port}");
    let host = common::build_host(config).await;
    let app = common::router_from(&host, "127.0.0.1:40000");

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/users/{}", UserId::new()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
