//! Phased service registration.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::application::{self, OrderCreatedIntegrationEvent, OrderCreatedIntegrationEventHandler};
use crate::cache::{DistributedLock, KeyRing, RedisCache};
use crate::clients::UserServiceClient;
use crate::config::AppConfig;
use crate::health::{HealthRegistry, MySqlHealthCheck, RabbitMqHealthCheck, RedisHealthCheck};
use crate::hub::ChatHub;
use crate::jobs::JobRunner;
use crate::lifecycle::Shutdown;
use crate::mediator::Mediator;
use crate::messaging::{
    EventBus, IntegrationEventPublisher, MessageMonitor, RabbitMqEventBus, SubscriberRegistry,
};
use crate::observability::metrics;
use crate::persistence::{should_ensure_schema, DbContext};
use crate::resilience::RetryPolicy;

use super::host::Host;
use super::infrastructure::Infrastructure;
use super::StartupError;

/// Every singleton the host shares between requests and workers.
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub shutdown: Arc<Shutdown>,
    pub cache: Option<RedisCache>,
    pub db: Option<DbContext>,
    pub rabbit: Option<Arc<RabbitMqEventBus>>,
    pub bus: Arc<dyn EventBus>,
    pub lock: Arc<dyn DistributedLock>,
    pub key_ring: Arc<KeyRing>,
    pub health: Arc<HealthRegistry>,
    pub mediator: Arc<Mediator>,
    pub users: UserServiceClient,
    pub monitor: Arc<MessageMonitor>,
    pub publisher: IntegrationEventPublisher,
    pub subscribers: Arc<SubscriberRegistry>,
    pub jobs: JobRunner,
    pub hub: Arc<ChatHub>,
    pub metrics: Option<PrometheusHandle>,
}

/// Builds the host one phase at a time.
pub struct ApplicationBuilder {
    config: Option<Arc<AppConfig>>,
    infrastructure: Option<Infrastructure>,
    services: Option<AppServices>,
    shutdown: Arc<Shutdown>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            infrastructure: None,
            services: None,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    fn require_config(&self, phase: &'static str) -> Result<Arc<AppConfig>, StartupError> {
        self.config.clone().ok_or(StartupError::MissingPhase {
            phase,
            required: "with_config",
        })
    }

    /// Connect to Redis, MySQL and the broker.
    pub async fn with_infrastructure(self) -> Result<Self, StartupError> {
        let config = self.require_config("with_infrastructure")?;
        let infrastructure = Infrastructure::connect(&config).await?;
        self.with_infrastructure_from(infrastructure)
    }

    /// Use an already-built set of dependencies, e.g. [`Infrastructure::in_memory`].
    pub fn with_infrastructure_from(mut self, infrastructure: Infrastructure) -> Result<Self, StartupError> {
        self.require_config("with_infrastructure")?;
        self.infrastructure = Some(infrastructure);
        Ok(self)
    }

    pub async fn with_services(mut self) -> Result<Self, StartupError> {
        let config = self.require_config("with_services")?;
        let infra = self.infrastructure.take().ok_or(StartupError::MissingPhase {
            phase: "with_services",
            required: "with_infrastructure",
        })?;
        let shutdown = self.shutdown.clone();

        let mut health = HealthRegistry::default();
        if let Some(cache) = &infra.cache {
            health = health.with_check(RedisHealthCheck::new(cache.clone()));
        }
        if let Some(db) = &infra.db {
            health = health.with_check(MySqlHealthCheck::new(db.clone()));
        }
        if let Some(rabbit) = &infra.rabbit {
            health = health.with_check(RabbitMqHealthCheck::new(rabbit.clone()));
        }
        tracing::debug!(checks = ?health.names(), "Health checks registered");

        let key_ring = Arc::new(KeyRing::initialize(infra.key_store.clone(), &config.data_protection).await?);

        let messaging = &config.messaging;
        let retry = RetryPolicy::new(
            messaging.max_attempts,
            messaging.retry_base_delay_ms,
            messaging.retry_max_delay_ms,
        );
        let monitor = Arc::new(MessageMonitor::new());
        let publisher = IntegrationEventPublisher::new(
            infra.bus.clone(),
            monitor.clone(),
            retry,
            config.env.service_name.clone(),
        );
        let subscribers = Arc::new(
            SubscriberRegistry::new(monitor.clone(), retry)
                .subscribe::<OrderCreatedIntegrationEvent, _>(OrderCreatedIntegrationEventHandler::new()),
        );

        let mediator = Arc::new(
            application::register_handlers(
                Mediator::builder(),
                infra.orders.clone(),
                infra.order_queries.clone(),
                publisher.clone(),
            )
            .build(),
        );

        let users = UserServiceClient::new(&config.user_service)?;
        let jobs = JobRunner::new(&config.jobs, infra.lock.clone(), shutdown.clone());
        let hub = Arc::new(ChatHub::new(shutdown.clone()));
        let metrics = if config.observability.metrics_enabled {
            Some(metrics::install()?)
        } else {
            None
        };

        tracing::info!(
            transport = publisher.transport(),
            user_service = %users.base_url(),
            "Services registered"
        );

        self.services = Some(AppServices {
            config,
            shutdown,
            cache: infra.cache,
            db: infra.db,
            rabbit: infra.rabbit,
            bus: infra.bus,
            lock: infra.lock,
            key_ring,
            health: Arc::new(health),
            mediator,
            users,
            monitor,
            publisher,
            subscribers,
            jobs,
            hub,
            metrics,
        });
        Ok(self)
    }

    /// Materialize the schema in development and assemble the pipeline.
    pub async fn build(self) -> Result<Host, StartupError> {
        let services = self.services.ok_or(StartupError::MissingPhase {
            phase: "build",
            required: "with_services",
        })?;

        if should_ensure_schema(&services.config.env) {
            if let Some(db) = &services.db {
                db.ensure_created().await?;
            }
        }

        Ok(Host::new(services))
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
