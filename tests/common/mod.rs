//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::connect_info::MockConnectInfo;
use axum::Router;
use service_host::bootstrap::Infrastructure;
use service_host::config::{AppConfig, Environment};
use service_host::{ApplicationBuilder, Host, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Start a programmable mock HTTP backend on an ephemeral port.
///
/// `f` receives the request line (`GET /api/users/... HTTP/1.1`) and returns
/// the status code and JSON body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let request_line = request.lines().next().unwrap_or_default().to_string();

                let (status, body) = f(request_line).await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Development config with fast retries and no external dependencies.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.env.name = Environment::Development;
    config.rabbitmq.enabled = false;
    config.server.bind_address = "127.0.0.1:0".to_string();
    config.server.shutdown_timeout_secs = 2;
    config.messaging.retry_base_delay_ms = 1;
    config.messaging.retry_max_delay_ms = 2;
    config.jobs.retry_base_delay_ms = 1;
    config.jobs.retry_max_delay_ms = 2;
    config
}

/// Build a host over in-memory infrastructure.
pub async fn build_host(config: AppConfig) -> Host {
    build_host_with(config, Infrastructure::in_memory()).await
}

/// Build a host over the given infrastructure.
pub async fn build_host_with(config: AppConfig, infrastructure: Infrastructure) -> Host {
    ApplicationBuilder::new()
        .with_config(config)
        .with_infrastructure_from(infrastructure)
        .unwrap()
        .with_services()
        .await
        .unwrap()
        .build()
        .await
        .unwrap()
}

/// The host's router as seen from `peer`.
pub fn router_from(host: &Host, peer: &str) -> Router {
    let peer: SocketAddr = peer.parse().unwrap();
    host.router().layer(MockConnectInfo(peer))
}

/// A host serving on an ephemeral port.
pub struct RunningHost {
    pub addr: SocketAddr,
    pub shutdown: Arc<Shutdown>,
    pub task: JoinHandle<()>,
}

impl RunningHost {
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("host did not stop")
            .unwrap();
    }
}

pub async fn spawn_host(config: AppConfig) -> RunningHost {
    let host = build_host(config).await;
    let shutdown = host.services().shutdown.clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        host.serve(listener).await.unwrap();
    });
    RunningHost {
        addr,
        shutdown,
        task,
    }
}
