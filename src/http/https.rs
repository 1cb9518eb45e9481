//! HTTPS redirection.
//!
//! Plain-HTTP requests are answered with `307` pointing at the same path on
//! `server.https_port`. A request counts as secure when it arrived on the TLS
//! listener or a proxy in front of us set `X-Forwarded-Proto: https`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Request extension set by the TLS listener.
#[derive(Debug, Clone, Copy)]
pub struct TlsConnection;

pub struct HttpsRedirect {
    https_port: Option<u16>,
    warned: AtomicBool,
}

impl HttpsRedirect {
    pub fn new(https_port: Option<u16>) -> Arc<Self> {
        Arc::new(Self {
            https_port,
            warned: AtomicBool::new(false),
        })
    }

    fn location(&self, port: u16, request: &Request<Body>) -> Option<String> {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| request.uri().host())?;
        let host = strip_port(host);
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        Some(if port == 443 {
            format!("https://{host}{path}")
        } else {
            format!("https://{host}:{port}{path}")
        })
    }
}

fn strip_port(host: &str) -> &str {
    // IPv6 literals keep their brackets: "[::1]:8080" -> "[::1]".
    if let Some(end) = host.rfind(']') {
        return &host[..=end];
    }
    host.split(':').next().unwrap_or(host)
}

fn is_secure(request: &Request<Body>) -> bool {
    request.extensions().get::<TlsConnection>().is_some()
        || request
            .headers()
            .get(X_FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("https"))
}

pub async fn redirect(
    State(policy): State<Arc<HttpsRedirect>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if is_secure(&request) {
        return next.run(request).await;
    }

    let Some(port) = policy.https_port else {
        if !policy.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!("Failed to determine the https port for redirect");
        }
        return next.run(request).await;
    };

    match policy
        .location(port, &request)
        .and_then(|l| HeaderValue::from_str(&l).ok())
    {
        Some(location) => {
            (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response()
        }
        None => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;

    fn app(port: Option<u16>) -> Router {
        Router::new()
            .route("/{*path}", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(HttpsRedirect::new(port), redirect))
    }

    #[tokio::test]
    async fn test_plain_request_is_redirected() {
        let response = app(Some(5001))
            .oneshot(
                Request::builder()
                    .uri("/api/orders?page=2")
                    .header(header::HOST, "localhost:5000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://localhost:5001/api/orders?page=2"
        );
    }

    #[tokio::test]
    async fn test_forwarded_https_passes() {
        let response = app(Some(443))
            .oneshot(
                Request::builder()
                    .uri("/x")
                    .header(header::HOST, "example.com")
                    .header(X_FORWARDED_PROTO, "https")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_no_port_passes_through() {
        let response = app(None)
            .oneshot(Request::builder().uri("/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.com:80"), "example.com");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
        assert_eq!(strip_port("example.com"), "example.com");
    }
}
