//! HTTP server setup.
//!
//! # Responsibilities
//! - Bind the listener (plain TCP, or rustls when `server.tls` is set)
//! - Serve the assembled pipeline with peer addresses attached
//! - Stop accepting when shutdown is broadcast and let in-flight requests
//!   finish within `server.shutdown_timeout_secs`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Extension, Router};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{ServerConfig, TlsConfig};
use crate::http::https::TlsConnection;
use crate::lifecycle::Shutdown;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("failed to load TLS certificate: {0}")]
    Tls(std::io::Error),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server for the host.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new(router: Router, config: ServerConfig) -> Self {
        Self { router, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn bind_addr(&self) -> Result<SocketAddr, ServerError> {
        self.config
            .bind_address
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.config.bind_address.clone()))
    }

    /// Bind and serve until shutdown.
    pub async fn run(self, shutdown: Arc<Shutdown>) -> Result<(), ServerError> {
        let addr = self.bind_addr()?;
        match self.config.tls.clone() {
            Some(tls) => self.run_tls(addr, &tls, shutdown).await,
            None => {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|source| ServerError::Bind { addr, source })?;
                self.serve(listener, shutdown).await
            }
        }
    }

    /// Serve plain HTTP on an already-bound listener.
    pub async fn serve(self, listener: TcpListener, shutdown: Arc<Shutdown>) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut stop = shutdown.subscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    async fn run_tls(self, addr: SocketAddr, tls: &TlsConfig, shutdown: Arc<Shutdown>) -> Result<(), ServerError> {
        let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
            .await
            .map_err(ServerError::Tls)?;
        let listener =
            std::net::TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let grace = Duration::from_secs(self.config.shutdown_timeout_secs);
        let mut stop = shutdown.subscribe();
        let stopper = handle.clone();
        tokio::spawn(async move {
            let _ = stop.recv().await;
            stopper.graceful_shutdown(Some(grace));
        });

        let app = self
            .router
            .layer(Extension(TlsConnection))
            .into_make_service_with_connect_info::<SocketAddr>();
        axum_server::from_tcp_rustls(listener, rustls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}
