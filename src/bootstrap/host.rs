//! The run loop.
//!
//! # Responsibilities
//! - Start background workers: event consumers, the failed-message retry job
//! - Serve HTTP until SIGINT/SIGTERM
//! - Broadcast shutdown and drain workers within
//!   `server.shutdown_timeout_secs`

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use crate::http::{pipeline, HttpServer};
use crate::jobs::FnJob;
use crate::lifecycle::{signals, BoxError};
use crate::messaging::{run_consumer, MessageDispatcher, FAILED_RETRY_JOB_ID};
use crate::resilience::RetryPolicy;

use super::builder::AppServices;

pub struct Host {
    services: AppServices,
    router: Router,
}

impl Host {
    pub(crate) fn new(services: AppServices) -> Self {
        let router = pipeline::build(&services);
        Self { services, router }
    }

    pub fn services(&self) -> &AppServices {
        &self.services
    }

    /// The assembled pipeline, for in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Start consumers and recurring jobs.
    pub fn start_background(&self) {
        let services = &self.services;

        if !services.subscribers.is_empty() {
            let bus = services.bus.clone();
            let group = services.config.rabbitmq.group.clone();
            let dispatcher: Arc<dyn MessageDispatcher> = services.subscribers.clone();
            let messaging = &services.config.messaging;
            let retry = RetryPolicy::new(
                messaging.max_attempts,
                messaging.retry_base_delay_ms,
                messaging.retry_max_delay_ms,
            );
            services.shutdown.track(
                "event-consumer",
                tokio::spawn(run_consumer(
                    bus,
                    group,
                    dispatcher,
                    services.shutdown.clone(),
                    retry,
                )),
            );
        }

        let publisher = services.publisher.clone();
        services.jobs.add_or_update_recurring(
            FAILED_RETRY_JOB_ID,
            Duration::from_secs(services.config.messaging.failed_retry_interval_secs),
            Arc::new(FnJob::new(FAILED_RETRY_JOB_ID, move |_| {
                let publisher = publisher.clone();
                async move {
                    let resent = publisher.retry_failed().await;
                    if resent > 0 {
                        tracing::info!(resent, "Re-published failed integration events");
                    }
                    Ok::<(), BoxError>(())
                }
            })),
        );
    }

    /// Serve until a shutdown signal, then drain.
    pub async fn run(self) -> Result<(), BoxError> {
        let shutdown = self.services.shutdown.clone();
        let mut stop = shutdown.subscribe();
        let trigger = shutdown.clone();
        shutdown.track(
            "signals",
            tokio::spawn(async move {
                tokio::select! {
                    () = signals::wait_for_shutdown() => trigger.trigger(),
                    _ = stop.recv() => {}
                }
            }),
        );

        self.start_background();
        let server = HttpServer::new(self.router.clone(), self.services.config.server.clone());
        let result = server.run(shutdown).await;
        self.stop().await;
        result.map_err(Into::into)
    }

    /// Serve on an already-bound listener until shutdown is triggered.
    pub async fn serve(self, listener: TcpListener) -> Result<(), BoxError> {
        self.start_background();
        let server = HttpServer::new(self.router.clone(), self.services.config.server.clone());
        let result = server.serve(listener, self.services.shutdown.clone()).await;
        self.stop().await;
        result.map_err(Into::into)
    }

    async fn stop(&self) {
        let timeout = Duration::from_secs(self.services.config.server.shutdown_timeout_secs);
        self.services.shutdown.drain(timeout).await;
        if let Some(rabbit) = &self.services.rabbit {
            rabbit.close().await;
        }
        if let Some(db) = &self.services.db {
            db.close().await;
        }
        tracing::info!("Host drained");
    }
}
