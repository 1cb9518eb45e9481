//! Connections to the external systems, created once per process.

use std::sync::Arc;

use crate::cache::{
    DistributedLock, InMemoryKeyStore, InMemoryLock, KeyStore, RedisCache, RedisKeyStore, RedisLock,
};
use crate::config::AppConfig;
use crate::messaging::{EventBus, InMemoryEventBus, RabbitMqEventBus};
use crate::persistence::{
    DbContext, InMemoryOrderStore, MySqlOrderQueryService, MySqlOrderRepository, OrderQueryService,
    OrderRepository,
};

use super::StartupError;

/// Handles to every backing service.
///
/// `cache`, `db` and `rabbit` are `None` for the in-memory set, which has no
/// dependencies to probe or close.
pub struct Infrastructure {
    pub cache: Option<RedisCache>,
    pub db: Option<DbContext>,
    pub rabbit: Option<Arc<RabbitMqEventBus>>,
    pub bus: Arc<dyn EventBus>,
    pub lock: Arc<dyn DistributedLock>,
    pub key_store: Arc<dyn KeyStore>,
    pub orders: Arc<dyn OrderRepository>,
    pub order_queries: Arc<dyn OrderQueryService>,
}

impl Infrastructure {
    /// Connect to Redis, MySQL and (when enabled) RabbitMQ.
    ///
    /// Redis and the broker are dialled eagerly so a bad connection string
    /// fails startup; the MySQL pool connects on first use.
    pub async fn connect(config: &AppConfig) -> Result<Self, StartupError> {
        let cache = RedisCache::connect(&config.connection_strings.redis).await?;

        let db = DbContext::connect_lazy(&config.connection_strings.mysql, &config.database)?;

        let (bus, rabbit) = if config.rabbitmq.enabled {
            let rabbit = Arc::new(RabbitMqEventBus::connect(&config.rabbitmq).await?);
            let bus: Arc<dyn EventBus> = rabbit.clone();
            (bus, Some(rabbit))
        } else {
            tracing::warn!("RabbitMQ disabled, integration events stay in process");
            let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
            (bus, None)
        };

        Ok(Self {
            lock: Arc::new(RedisLock::new(cache.connection())),
            key_store: Arc::new(RedisKeyStore::new(
                cache.connection(),
                &config.data_protection.application_name,
            )),
            orders: Arc::new(MySqlOrderRepository::new(db.clone())),
            order_queries: Arc::new(MySqlOrderQueryService::new(db.clone())),
            cache: Some(cache),
            db: Some(db),
            rabbit,
            bus,
        })
    }

    /// Process-local twins of every dependency.
    pub fn in_memory() -> Self {
        let store = InMemoryOrderStore::new();
        Self {
            cache: None,
            db: None,
            rabbit: None,
            bus: Arc::new(InMemoryEventBus::new()),
            lock: Arc::new(InMemoryLock::new()),
            key_store: Arc::new(InMemoryKeyStore::new()),
            orders: Arc::new(store.clone()),
            order_queries: Arc::new(store),
        }
    }
}
