//! Distributed cache subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     redis URL → Client::open → ConnectionManager (one per process)
//!
//! Consumers (cheap clones of the manager, one multiplexed connection):
//!     RedisCache::get_json / set_json   → JSON values with optional TTL
//!     RedisLock (lock.rs)               → SET NX PX / Lua compare-delete
//!     RedisKeyStore (keyring.rs)        → HGETALL / HSET on the key ring hash
//!     RedisHealthCheck                  → PING
//! ```
//!
//! # Design Decisions
//! - The manager connects eagerly: an unreachable cache is a startup failure
//! - The manager reconnects transparently after a dropped connection
//! - Every consumer sits behind a trait with an in-memory twin for tests

pub mod keyring;
pub mod lock;

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use keyring::{DataProtectionKey, InMemoryKeyStore, KeyRing, KeyRingError, KeyStore, RedisKeyStore};
pub use lock::{DistributedLock, InMemoryLock, LockError, LockHandle, RedisLock};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cached value is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Handle to the shared Redis connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to distributed cache");
        Ok(Self { conn })
    }

    /// A clone of the managed connection.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(CacheError::from)
    }

    /// Store a value; `ttl` of `None` keeps it until removed.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(value)?;
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, raw, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, raw).await?;
            }
        }
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
