//! Encrypted cache-aside layer for user and profile snapshots.
//!
//! The cache is never authoritative. Read-side failures fall back to the
//! store; a write that cannot refresh its cache entry evicts it instead.

use anyhow::anyhow;
use async_trait::async_trait;
use bb8_redis::redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::{
    config::CacheConfig,
    db::redis::RedisPool,
    types::PrincipalId,
    utils::{encryption::CacheCipher, within},
};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache miss")]
    Miss,
    #[error("cache not enabled")]
    NotEnabled,
    #[error("cached value could not be decrypted")]
    DecryptFailure,
    #[error("cache backend failure: {0}")]
    Store(anyhow::Error),
}

/// Raw key/value backend holding sealed strings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

pub struct RedisCacheStore {
    pool: RedisPool,
}

impl RedisCacheStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

/// Process-local backend with per-entry expiry.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw sealed value, for inspection.
    pub fn raw(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory cache lock poisoned"))?;
        let now = Instant::now();
        if matches!(entries.get(key), Some((_, expires)) if *expires <= now) {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> anyhow::Result<()> {
        let expires = Instant::now() + Duration::from_secs(ttl_seconds);
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory cache lock poisoned"))?
            .insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory cache lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub struct IdentityCache {
    backend: Option<(Arc<dyn CacheStore>, CacheCipher)>,
    user_prefix: String,
    profile_prefix: String,
    user_ttl_seconds: u64,
    profile_ttl_seconds: u64,
    timeout: Duration,
}

impl IdentityCache {
    pub fn new(backend: Arc<dyn CacheStore>, cipher: CacheCipher, config: &CacheConfig) -> Self {
        Self {
            backend: Some((backend, cipher)),
            ..Self::disabled_with(config)
        }
    }

    pub fn disabled() -> Self {
        Self::disabled_with(&CacheConfig::disabled())
    }

    fn disabled_with(config: &CacheConfig) -> Self {
        Self {
            backend: None,
            user_prefix: config.user_prefix.clone(),
            profile_prefix: config.profile_prefix.clone(),
            user_ttl_seconds: config.user_ttl_seconds,
            profile_ttl_seconds: config.profile_ttl_seconds,
            timeout: config.timeout(),
        }
    }

    pub fn user_key(&self, id: PrincipalId) -> String {
        format!("{}:{}", self.user_prefix, id)
    }

    pub fn profile_key(&self, id: PrincipalId) -> String {
        format!("{}:{}", self.user_key(id), self.profile_prefix)
    }

    pub fn user_ttl_seconds(&self) -> u64 {
        self.user_ttl_seconds
    }

    pub fn profile_ttl_seconds(&self) -> u64 {
        self.profile_ttl_seconds
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, CacheError> {
        let (backend, cipher) = self.backend.as_ref().ok_or(CacheError::NotEnabled)?;
        let sealed = within("cache_get", self.timeout, backend.get(key))
            .await
            .map_err(|e| CacheError::Store(e.into()))?
            .map_err(CacheError::Store)?
            .ok_or(CacheError::Miss)?;
        let plaintext = cipher
            .open(&sealed)
            .map_err(|_| CacheError::DecryptFailure)?;
        serde_json::from_slice(&plaintext).map_err(|_| CacheError::DecryptFailure)
    }

    /// No-op when the cache is disabled.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: u64,
    ) -> Result<(), CacheError> {
        let Some((backend, cipher)) = self.backend.as_ref() else {
            return Ok(());
        };
        let plaintext = serde_json::to_vec(value).map_err(|e| CacheError::Store(e.into()))?;
        let sealed = cipher.seal(&plaintext).map_err(CacheError::Store)?;
        within("cache_set", self.timeout, backend.set(key, sealed, ttl_seconds))
            .await
            .map_err(|e| CacheError::Store(e.into()))?
            .map_err(CacheError::Store)
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let Some((backend, _)) = self.backend.as_ref() else {
            return Ok(());
        };
        within("cache_delete", self.timeout, backend.delete(key))
            .await
            .map_err(|e| CacheError::Store(e.into()))?
            .map_err(CacheError::Store)
    }

    /// Cache-aside read: serve a hit, otherwise load from the store and
    /// populate on a best-effort basis.
    pub async fn fetch<T, E, F, Fut>(&self, key: &str, ttl_seconds: u64, load: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        match self.get::<T>(key).await {
            Ok(value) => return Ok(Some(value)),
            Err(CacheError::Miss | CacheError::NotEnabled) => {}
            Err(err) => tracing::warn!(key, error = %err, "Cache read failed, using store"),
        }

        let loaded = load().await?;
        if let Some(value) = &loaded {
            if let Err(err) = self.set(key, value, ttl_seconds).await {
                tracing::warn!(key, error = %err, "Cache populate failed");
            }
        }
        Ok(loaded)
    }

    /// Refreshes an entry after a successful store write. If the refresh
    /// fails the entry is evicted; only a failed eviction is an error.
    pub async fn overwrite<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_seconds: u64,
    ) -> anyhow::Result<()> {
        let Err(err) = self.set(key, value, ttl_seconds).await else {
            return Ok(());
        };
        tracing::warn!(key, error = %err, "Cache overwrite failed, evicting entry");
        self.delete(key).await.map_err(|evict_err| {
            anyhow!(
                "cache entry {} may be stale: overwrite failed ({}) and eviction failed ({})",
                key,
                err,
                evict_err
            )
        })
    }

    /// Drops an entry, logging rather than failing.
    pub async fn invalidate(&self, key: &str) {
        if let Err(err) = self.delete(key).await {
            tracing::warn!(key, error = %err, "Cache invalidation failed");
        }
    }
}
