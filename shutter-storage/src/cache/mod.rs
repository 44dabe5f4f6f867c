//! Cache layer
//!
//! - [`CacheStore`]: raw key/value backend with per-key expiry
//! - [`EntityCache`]: typed cache-aside wrapper for one entity kind
//! - [`ListingCache`]: cached listing pages, bounded-staleness only
//!
//! Backends: [`InMemoryCacheStore`], [`LmdbCacheStore`] and, with the `redis`
//! feature, `RedisCacheStore`.

mod codec;
mod entity_cache;
mod key;
mod listing;
mod lmdb_backend;
mod memory_backend;
mod read;
#[cfg(feature = "redis")]
mod redis_backend;
mod traits;

pub use codec::{decode, encode};
pub use entity_cache::EntityCache;
pub use key::CacheKey;
pub use listing::ListingCache;
pub use lmdb_backend::{LmdbCacheError, LmdbCacheStore};
pub use memory_backend::InMemoryCacheStore;
pub use read::CachedRead;
#[cfg(feature = "redis")]
pub use redis_backend::RedisCacheStore;
pub use traits::{CacheStats, CacheStore, Cacheable};
