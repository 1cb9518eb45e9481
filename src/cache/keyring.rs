//! Authentication key ring.
//!
//! Keys live in a store shared by every instance of the application (a Redis
//! hash in production), so a payload protected by one instance can be
//! unprotected by any other.
//!
//! Token format: `{key id}.{base64url payload}.{base64url mac}` where the MAC is
//! HMAC-SHA256 over `application \0 purpose \0 payload`. Payloads are
//! authenticated, not encrypted.
//!
//! New payloads are always protected with the newest active key. Expired keys
//! still verify old payloads until they are revoked.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::DataProtectionConfig;

type HmacSha256 = Hmac<Sha256>;

const KEY_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum KeyRingError {
    #[error("key store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("stored key is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("key {0} has corrupt material")]
    CorruptKey(Uuid),

    #[error("protected payload is malformed")]
    MalformedToken,

    #[error("payload was protected with unknown key {0}")]
    UnknownKey(Uuid),

    #[error("key {0} has been revoked")]
    RevokedKey(Uuid),

    #[error("payload signature is invalid")]
    InvalidSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProtectionKey {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub activates_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Base64 (standard alphabet) secret.
    pub material: String,
    #[serde(default)]
    pub revoked: bool,
}

impl DataProtectionKey {
    pub fn generate(lifetime: Duration) -> Self {
        let now = Utc::now();
        let secret: [u8; KEY_BYTES] = rand::random();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            activates_at: now,
            expires_at: now + lifetime,
            material: STANDARD.encode(secret),
            revoked: false,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.activates_at <= now && now < self.expires_at
    }

    fn mac(&self, application: &str, purpose: &str, payload: &[u8]) -> Result<HmacSha256, KeyRingError> {
        let secret = STANDARD
            .decode(&self.material)
            .map_err(|_| KeyRingError::CorruptKey(self.id))?;
        let mut mac =
            HmacSha256::new_from_slice(&secret).map_err(|_| KeyRingError::CorruptKey(self.id))?;
        mac.update(application.as_bytes());
        mac.update(&[0]);
        mac.update(purpose.as_bytes());
        mac.update(&[0]);
        mac.update(payload);
        Ok(mac)
    }
}

/// Persistent home of the key ring.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<DataProtectionKey>, KeyRingError>;

    /// Insert or replace a key by id.
    async fn store(&self, key: &DataProtectionKey) -> Result<(), KeyRingError>;
}

/// Keys in the Redis hash `DataProtection-Keys:{application}`, one JSON
/// document per field.
#[derive(Clone)]
pub struct RedisKeyStore {
    conn: ConnectionManager,
    hash_key: String,
}

impl RedisKeyStore {
    pub fn new(conn: ConnectionManager, application: &str) -> Self {
        Self {
            conn,
            hash_key: format!("DataProtection-Keys:{application}"),
        }
    }

    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }
}

#[async_trait]
impl KeyStore for RedisKeyStore {
    async fn load_all(&self) -> Result<Vec<DataProtectionKey>, KeyRingError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(&self.hash_key).await?;
        fields
            .values()
            .map(|raw| serde_json::from_str(raw).map_err(KeyRingError::from))
            .collect()
    }

    async fn store(&self, key: &DataProtectionKey) -> Result<(), KeyRingError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(key)?;
        let _: () = conn.hset(&self.hash_key, key.id.to_string(), raw).await?;
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryKeyStore {
    keys: Arc<DashMap<Uuid, DataProtectionKey>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn load_all(&self) -> Result<Vec<DataProtectionKey>, KeyRingError> {
        Ok(self.keys.iter().map(|e| e.value().clone()).collect())
    }

    async fn store(&self, key: &DataProtectionKey) -> Result<(), KeyRingError> {
        self.keys.insert(key.id, key.clone());
        Ok(())
    }
}

pub struct KeyRing {
    store: Arc<dyn KeyStore>,
    keys: RwLock<Vec<DataProtectionKey>>,
    application: String,
    lifetime: Duration,
}

impl KeyRing {
    /// Load the ring from the store and make sure an active key exists.
    pub async fn initialize(
        store: Arc<dyn KeyStore>,
        config: &DataProtectionConfig,
    ) -> Result<Self, KeyRingError> {
        let ring = Self {
            store,
            keys: RwLock::new(Vec::new()),
            application: config.application_name.clone(),
            lifetime: Duration::days(config.key_lifetime_days),
        };
        ring.reload().await?;
        let key = ring.current_key().await?;
        tracing::info!(
            application = %ring.application,
            key_id = %key.id,
            expires_at = %key.expires_at,
            "Key ring ready"
        );
        Ok(ring)
    }

    /// Replace the cached ring with the store's contents.
    pub async fn reload(&self) -> Result<(), KeyRingError> {
        let loaded = self.store.load_all().await?;
        *self.keys.write().await = loaded;
        Ok(())
    }

    pub async fn keys(&self) -> Vec<DataProtectionKey> {
        self.keys.read().await.clone()
    }

    /// Newest active key, generating and persisting one if none exists.
    pub async fn current_key(&self) -> Result<DataProtectionKey, KeyRingError> {
        let now = Utc::now();
        if let Some(key) = newest_active(&self.keys.read().await, now) {
            return Ok(key.clone());
        }

        let mut keys = self.keys.write().await;
        // Another task may have generated one while we waited for the lock.
        if let Some(key) = newest_active(&keys, now) {
            return Ok(key.clone());
        }
        let key = DataProtectionKey::generate(self.lifetime);
        self.store.store(&key).await?;
        tracing::info!(key_id = %key.id, "Generated new data protection key");
        keys.push(key.clone());
        Ok(key)
    }

    /// Generate a new key that immediately becomes current.
    pub async fn rotate(&self) -> Result<DataProtectionKey, KeyRingError> {
        let key = DataProtectionKey::generate(self.lifetime);
        self.store.store(&key).await?;
        self.keys.write().await.push(key.clone());
        tracing::info!(key_id = %key.id, "Rotated data protection key");
        Ok(key)
    }

    /// Revoke a key: payloads it protected no longer verify.
    pub async fn revoke(&self, id: Uuid) -> Result<(), KeyRingError> {
        let mut keys = self.keys.write().await;
        let key = keys
            .iter_mut()
            .find(|k| k.id == id)
            .ok_or(KeyRingError::UnknownKey(id))?;
        key.revoked = true;
        self.store.store(key).await?;
        tracing::warn!(key_id = %id, "Revoked data protection key");
        Ok(())
    }

    pub async fn protect(&self, purpose: &str, payload: &[u8]) -> Result<String, KeyRingError> {
        let key = self.current_key().await?;
        let tag = key
            .mac(&self.application, purpose, payload)?
            .finalize()
            .into_bytes();
        Ok(format!(
            "{}.{}.{}",
            key.id,
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    pub async fn unprotect(&self, purpose: &str, token: &str) -> Result<Vec<u8>, KeyRingError> {
        let mut parts = token.split('.');
        let (Some(id), Some(payload), Some(tag), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(KeyRingError::MalformedToken);
        };

        let id = Uuid::parse_str(id).map_err(|_| KeyRingError::MalformedToken)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| KeyRingError::MalformedToken)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| KeyRingError::MalformedToken)?;

        let key = match self.find(id).await {
            Some(key) => key,
            None => {
                // Another instance may have rotated since we last loaded.
                self.reload().await?;
                self.find(id).await.ok_or(KeyRingError::UnknownKey(id))?
            }
        };
        if key.revoked {
            return Err(KeyRingError::RevokedKey(id));
        }

        key.mac(&self.application, purpose, &payload)?
            .verify_slice(&tag)
            .map_err(|_| KeyRingError::InvalidSignature)?;
        Ok(payload)
    }

    async fn find(&self, id: Uuid) -> Option<DataProtectionKey> {
        self.keys.read().await.iter().find(|k| k.id == id).cloned()
    }
}

fn newest_active(keys: &[DataProtectionKey], now: DateTime<Utc>) -> Option<&DataProtectionKey> {
    keys.iter()
        .filter(|k| k.is_active(now))
        .max_by_key(|k| k.activates_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ring() -> (KeyRing, Arc<InMemoryKeyStore>) {
        let store = Arc::new(InMemoryKeyStore::new());
        let ring = KeyRing::initialize(store.clone(), &DataProtectionConfig::default())
            .await
            .unwrap();
        (ring, store)
    }

    #[tokio::test]
    async fn test_initialize_generates_and_persists_key() {
        let (ring, store) = ring().await;
        let stored = store.load_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(ring.current_key().await.unwrap().id, stored[0].id);
    }

    #[tokio::test]
    async fn test_protect_roundtrip() {
        let (ring, _) = ring().await;
        let token = ring.protect("auth.cookie", b"user-42").await.unwrap();
        assert_eq!(ring.unprotect("auth.cookie", &token).await.unwrap(), b"user-42");
    }

    #[tokio::test]
    async fn test_rejects_tampering_and_purpose_mismatch() {
        let (ring, _) = ring().await;
        let token = ring.protect("auth.cookie", b"user-42").await.unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(b"admin");
        parts[1] = &forged;
        let tampered = parts.join(".");
        assert!(matches!(
            ring.unprotect("auth.cookie", &tampered).await,
            Err(KeyRingError::InvalidSignature)
        ));

        assert!(matches!(
            ring.unprotect("csrf", &token).await,
            Err(KeyRingError::InvalidSignature)
        ));
        assert!(matches!(
            ring.unprotect("auth.cookie", "garbage").await,
            Err(KeyRingError::MalformedToken)
        ));
    }

    #[tokio::test]
    async fn test_old_payloads_survive_rotation_but_not_revocation() {
        let (ring, _) = ring().await;
        let old_key = ring.current_key().await.unwrap();
        let token = ring.protect("p", b"x").await.unwrap();

        let new_key = ring.rotate().await.unwrap();
        assert_eq!(ring.current_key().await.unwrap().id, new_key.id);
        assert_eq!(ring.unprotect("p", &token).await.unwrap(), b"x");

        ring.revoke(old_key.id).await.unwrap();
        assert!(matches!(
            ring.unprotect("p", &token).await,
            Err(KeyRingError::RevokedKey(_))
        ));
    }

    #[tokio::test]
    async fn test_key_from_another_instance_is_picked_up() {
        let store = Arc::new(InMemoryKeyStore::new());
        let config = DataProtectionConfig::default();
        let a = KeyRing::initialize(store.clone(), &config).await.unwrap();
        let b = KeyRing::initialize(store.clone(), &config).await.unwrap();

        a.rotate().await.unwrap();
        let token = a.protect("p", b"shared").await.unwrap();
        assert_eq!(b.unprotect("p", &token).await.unwrap(), b"shared");
    }

    #[test]
    fn test_expired_key_is_not_active() {
        let mut key = DataProtectionKey::generate(Duration::days(1));
        assert!(key.is_active(Utc::now()));
        key.expires_at = Utc::now() - Duration::seconds(1);
        assert!(!key.is_active(Utc::now()));
    }
}
