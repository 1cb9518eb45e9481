//! Distributed lock.
//!
//! A lock is a key holding a random token with an expiry. Only the holder of
//! the token may release it, so a lease that expired and was re-acquired by
//! another instance is never deleted by the previous owner.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::Script;
use thiserror::Error;
use uuid::Uuid;

const KEY_PREFIX: &str = "lock:";

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

/// Proof of ownership returned by a successful acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub key: String,
    token: String,
}

impl LockHandle {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            token: Uuid::new_v4().to_string(),
        }
    }
}

#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Take the lock unless someone else holds it. `None` means contended.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockHandle>, LockError>;

    /// Release a held lock. Returns `false` if the lease had already expired.
    async fn release(&self, handle: LockHandle) -> Result<bool, LockError>;
}

/// Lock shared across every instance connected to the same Redis.
#[derive(Clone)]
pub struct RedisLock {
    conn: ConnectionManager,
}

impl RedisLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockHandle>, LockError> {
        let mut conn = self.conn.clone();
        let handle = LockHandle::new(key);
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let reply: Option<String> = redis::cmd("SET")
            .arg(format!("{KEY_PREFIX}{key}"))
            .arg(&handle.token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|_| handle))
    }

    async fn release(&self, handle: LockHandle) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = Script::new(RELEASE_SCRIPT)
            .key(format!("{KEY_PREFIX}{}", handle.key))
            .arg(&handle.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

/// Process-local lock with the same lease semantics.
#[derive(Clone, Default)]
pub struct InMemoryLock {
    held: Arc<DashMap<String, (String, Instant)>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockHandle>, LockError> {
        let handle = LockHandle::new(key);
        let expires = Instant::now() + ttl;

        match self.held.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                if e.get().1 > Instant::now() {
                    return Ok(None);
                }
                e.insert((handle.token.clone(), expires));
            }
            Entry::Vacant(e) => {
                e.insert((handle.token.clone(), expires));
            }
        }
        Ok(Some(handle))
    }

    async fn release(&self, handle: LockHandle) -> Result<bool, LockError> {
        let removed = self
            .held
            .remove_if(&handle.key, |_, (token, expires)| {
                *token == handle.token && *expires > Instant::now()
            })
            .is_some();
        Ok(removed)
    }
}
