//! Startup failures and the fatal boundary.

use std::net::TcpListener;

use service_host::lifecycle::{run_guarded, BoxError, Outcome};
use service_host::{ApplicationBuilder, StartupError};

mod common;

/// A port nothing listens on.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_unreachable_redis_is_fatal_and_never_binds() {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let mut config = common::test_config();
    config.server.bind_address = format!("127.0.0.1:{port}");
    config.connection_strings.redis = format!("redis://127.0.0.1:{}", closed_port());

    let outcome = run_guarded("test", || async move {
        let host = ApplicationBuilder::new()
            .with_config(config)
            .with_infrastructure()
            .await?
            .with_services()
            .await?
            .build()
            .await?;
        host.run().await
    })
    .await;

    assert_eq!(outcome, Outcome::Failed);
    // The listener was never bound, so the port is still free.
    assert!(TcpListener::bind(("127.0.0.1", port)).is_ok());
}

#[tokio::test]
async fn test_infrastructure_error_is_typed() {
    let mut config = common::test_config();
    config.connection_strings.redis = format!("redis://127.0.0.1:{}", closed_port());

    let err = ApplicationBuilder::new()
        .with_config(config)
        .with_infrastructure()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, StartupError::Redis(_)));
}

#[tokio::test]
async fn test_invalid_config_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("appsettings.toml");
    std::fs::write(&path, "[server]\nbind_address = \"nowhere\"\n").unwrap();

    let outcome = run_guarded("test", || async move {
        service_host::config::load_config(&path)?;
        Ok::<(), BoxError>(())
    })
    .await;
    assert_eq!(outcome, Outcome::Failed);
}

#[tokio::test]
async fn test_host_stops_on_shutdown() {
    let running = common::spawn_host(common::test_config()).await;
    let body = reqwest::get(format!("http://{}/health", running.addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "Healthy");
    running.stop().await;
}
