//! Cache backend traits and cacheable entity marker.
//!
//! This module defines the traits that must be implemented by cache backends
//! and entities that can be cached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use shutter_core::constants::MAX_CACHE_TTL_SECS;
use shutter_core::{Identified, ShutterResult};

use super::key::CacheKey;

/// Marker trait for types that can be cached.
///
/// Blanket-implemented for every identified record that round-trips through
/// serde. `kind()` selects the reserved key prefix and `id()` the slot.
pub trait Cacheable: Identified + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Cacheable for T where
    T: Identified + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// `ttl` capped at the longest TTL a backend will store.
pub(crate) fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.min(Duration::from_secs(MAX_CACHE_TTL_SECS))
}

/// Key/value backend with per-key expiry.
///
/// The cache is an accelerator, never the system of record. Implementations
/// must be safe for concurrent use; connection pooling is their concern.
/// Expired entries must never be returned by `get`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the raw bytes stored under `key`, or `None` when absent/expired.
    async fn get(&self, key: &CacheKey) -> ShutterResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous entry, expiring
    /// after `ttl`. TTLs beyond one year are clamped, never rejected.
    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> ShutterResult<()>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &CacheKey) -> ShutterResult<()>;

    /// Usage statistics.
    async fn stats(&self) -> ShutterResult<CacheStats>;
}

#[async_trait]
impl<C> CacheStore for Arc<C>
where
    C: CacheStore + ?Sized,
{
    async fn get(&self, key: &CacheKey) -> ShutterResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> ShutterResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> ShutterResult<()> {
        (**self).delete(key).await
    }

    async fn stats(&self) -> ShutterResult<CacheStats> {
        (**self).stats().await
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (including expired entries).
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of entries dropped because their TTL elapsed.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
