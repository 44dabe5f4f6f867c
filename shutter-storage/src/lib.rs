//! Shutter Storage - Cache-Aside Layer and Durable Store Traits
//!
//! The cache is an accelerator in front of the durable store, never the
//! system of record. Handles to both are passed in explicitly; nothing in
//! this crate is a process-wide singleton.

pub mod cache;
pub mod cache_aside;
pub mod memory_store;
pub mod store;

pub use cache::{
    CacheKey, CacheStats, CacheStore, Cacheable, CachedRead, EntityCache, InMemoryCacheStore,
    ListingCache, LmdbCacheError, LmdbCacheStore,
};
#[cfg(feature = "redis")]
pub use cache::RedisCacheStore;
pub use cache_aside::CacheAside;
pub use memory_store::InMemoryStore;
pub use store::{DurableStore, EngagementStore, UserStore};

use std::sync::Arc;

use shutter_core::{CacheBackendKind, CacheSettings, ConfigError, ShutterResult};
use tracing::info;

/// Open the cache backend selected by `settings`.
///
/// # Errors
///
/// Fails if the backend cannot be opened or reached, or if `redis` is
/// selected in a build without the `redis` feature.
pub async fn open_cache_store(settings: &CacheSettings) -> ShutterResult<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match settings.backend {
        CacheBackendKind::Memory => Arc::new(InMemoryCacheStore::new()),
        CacheBackendKind::Lmdb => {
            Arc::new(LmdbCacheStore::new(&settings.path, settings.max_size_mb)?)
        }
        #[cfg(feature = "redis")]
        CacheBackendKind::Redis => Arc::new(RedisCacheStore::connect(&settings.redis_url).await?),
        #[cfg(not(feature = "redis"))]
        CacheBackendKind::Redis => {
            return Err(ConfigError::InvalidValue {
                field: "SHUTTER_CACHE_BACKEND".to_string(),
                value: "redis".to_string(),
                reason: "built without the `redis` feature".to_string(),
            }
            .into())
        }
    };

    info!(backend = ?settings.backend, ttl_secs = settings.entity_ttl.as_secs(), "cache store opened");
    Ok(store)
}
