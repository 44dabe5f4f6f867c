//! Typed cache-aside wrapper for one entity kind.
//!
//! `EntityCache<T>` owns the serialization boundary: callers hand it domain
//! values and ids, it hands the backend [`CacheKey`]s and bytes. It holds no
//! mutable state beyond its configuration and is cheap to clone and share.
//!
//! # Caller obligations
//!
//! - After a successful create/update/delete of entity `id`, call
//!   [`EntityCache::invalidate`] before reporting success.
//! - On a read miss, call [`EntityCache::put`] only after the authoritative
//!   read has succeeded.
//! - A failed `put` or `invalidate` is non-fatal: log it and carry on, the
//!   durable store already holds the truth.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use shutter_core::constants::DEFAULT_CACHE_TTL_SECS;
use shutter_core::{EntityId, EntityKind, ShutterResult};
use tracing::{debug, warn};

use super::codec;
use super::key::CacheKey;
use super::traits::{CacheStore, Cacheable};

/// Cache-aside accessor for entities of type `T`.
///
/// # Example
///
/// ```ignore
/// let posts: EntityCache<Post> = EntityCache::new(store.clone());
/// if let Some(post) = posts.get(42).await {
///     return Ok(post);
/// }
/// let post = durable.get(42).await?;
/// if let Err(e) = posts.put(&post).await {
///     tracing::warn!(error = %e, "cache write failed");
/// }
/// ```
pub struct EntityCache<T, C: ?Sized = dyn CacheStore> {
    store: Arc<C>,
    ttl: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C> EntityCache<T, C>
where
    T: Cacheable,
    C: CacheStore + ?Sized,
{
    /// Wrap `store` with the default 30 minute TTL.
    pub fn new(store: Arc<C>) -> Self {
        Self::with_ttl(store, Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }

    pub fn with_ttl(store: Arc<C>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            _marker: PhantomData,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn kind(&self) -> EntityKind {
        T::kind()
    }

    pub fn store(&self) -> &Arc<C> {
        &self.store
    }

    /// Key under which entity `id` is cached.
    pub fn key_for(id: EntityId) -> CacheKey {
        CacheKey::entity(T::kind(), id)
    }

    /// Look up entity `id`.
    ///
    /// Returns `None` on a miss. Backend failures and undecodable entries are
    /// logged and reported as a miss as well; this never fails.
    pub async fn get(&self, id: EntityId) -> Option<T> {
        let key = Self::key_for(id);

        let bytes = match self.store.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match codec::decode::<T>(&key, &bytes) {
            Ok(value) => {
                debug!(key = %key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "undecodable cache entry, treating as miss");
                None
            }
        }
    }

    /// Write `entity` under its key, replacing any previous entry.
    pub async fn put(&self, entity: &T) -> ShutterResult<()> {
        let key = Self::key_for(entity.id());
        let bytes = codec::encode(T::kind(), entity)?;
        self.store.set(&key, bytes, self.ttl).await?;
        debug!(key = %key, ttl_secs = self.ttl.as_secs(), "cache populated");
        Ok(())
    }

    /// Drop entity `id` from the cache. Dropping an absent entry succeeds.
    pub async fn invalidate(&self, id: EntityId) -> ShutterResult<()> {
        let key = Self::key_for(id);
        self.store.delete(&key).await?;
        debug!(key = %key, "cache invalidated");
        Ok(())
    }
}

impl<T, C: ?Sized> Clone for EntityCache<T, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ttl: self.ttl,
            _marker: PhantomData,
        }
    }
}

impl<T, C: ?Sized> std::fmt::Debug for EntityCache<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("entity", &std::any::type_name::<T>())
            .field("ttl", &self.ttl)
            .finish()
    }
}
