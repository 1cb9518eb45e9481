//! Dashboard authorization.
//!
//! `/hangfire` and `/cap` expose operational controls (trigger a job,
//! re-publish messages). When `dashboard_local_only` is set only requests
//! whose peer address is loopback get through.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::connect_info::{ConnectInfo, MockConnectInfo};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::http::error::ProblemDetails;

/// Peer address recorded by the listener.
fn peer_addr(request: &Request<Body>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .or_else(|| {
            request
                .extensions()
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| *addr)
        })
}

pub async fn require_local(request: Request<Body>, next: Next) -> Response {
    match peer_addr(&request) {
        Some(addr) if addr.ip().is_loopback() => next.run(request).await,
        peer => {
            tracing::warn!(
                peer = ?peer,
                path = %request.uri().path(),
                "Rejected non-local dashboard request"
            );
            ProblemDetails::new(
                StatusCode::FORBIDDEN,
                Some("The dashboard only accepts local requests.".into()),
            )
            .into_response()
        }
    }
}

/// Wrap a dashboard router with the local-only policy when enabled.
pub fn dashboard(router: Router, local_only: bool) -> Router {
    if local_only {
        router.route_layer(middleware::from_fn(require_local))
    } else {
        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tower::ServiceExt;

    fn app(local_only: bool, peer: &str) -> Router {
        let peer: SocketAddr = peer.parse().unwrap();
        dashboard(Router::new().route("/", get(|| async { "ok" })), local_only)
            .layer(MockConnectInfo(peer))
    }

    async fn status(app: Router) -> StatusCode {
        app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_loopback_allowed() {
        assert_eq!(status(app(true, "127.0.0.1:5000")).await, StatusCode::OK);
        assert_eq!(status(app(true, "[::1]:5000")).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_remote_forbidden() {
        assert_eq!(status(app(true, "10.1.2.3:5000")).await, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_policy_disabled() {
        assert_eq!(status(app(false, "10.1.2.3:5000")).await, StatusCode::OK);
    }
}
