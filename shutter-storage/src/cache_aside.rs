//! Cache-aside reads and invalidating writes over one entity kind.
//!
//! [`CacheAside`] pairs an [`EntityCache`] with the [`DurableStore`] that
//! owns the truth and enforces the ordering rules in one place:
//!
//! - a read miss populates the cache only after the store read succeeded;
//! - a successful mutation invalidates the entity before returning;
//! - cache failures are logged and absorbed, store failures propagate.

use std::future::Future;
use std::sync::Arc;

use shutter_core::{EntityId, ShutterResult};
use tracing::{debug, warn};

use crate::cache::{CacheStore, Cacheable, CachedRead, EntityCache};
use crate::store::DurableStore;

/// Cache-aside access path for entities of type `T`.
pub struct CacheAside<T, S: ?Sized, C: ?Sized = dyn CacheStore> {
    cache: EntityCache<T, C>,
    store: Arc<S>,
}

impl<T, S, C> CacheAside<T, S, C>
where
    T: Cacheable,
    S: DurableStore<T> + ?Sized,
    C: CacheStore + ?Sized,
{
    pub fn new(cache: EntityCache<T, C>, store: Arc<S>) -> Self {
        Self { cache, store }
    }

    pub fn cache(&self) -> &EntityCache<T, C> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Read entity `id`, from the cache when possible.
    ///
    /// # Errors
    ///
    /// Only durable store errors (`NotFound`, `Unavailable`, ...). A cache
    /// outage turns every read into a store read.
    pub async fn cached_read(&self, id: EntityId) -> ShutterResult<CachedRead<T>> {
        if let Some(value) = self.cache.get(id).await {
            return Ok(CachedRead::from_cache(value));
        }

        let value = self.store.get(id).await?;

        if let Err(e) = self.cache.put(&value).await {
            warn!(kind = %self.cache.kind(), id, error = %e, "failed to populate cache after miss");
        }
        Ok(CachedRead::from_store(value))
    }

    /// Run `mutation` against the store, then invalidate entity `id`.
    ///
    /// The cache is only touched if the mutation succeeded. A failed
    /// invalidation is logged; the entry then ages out with its TTL.
    pub async fn write_then_invalidate<F, Fut, R>(&self, id: EntityId, mutation: F) -> ShutterResult<R>
    where
        F: FnOnce(Arc<S>) -> Fut + Send,
        Fut: Future<Output = ShutterResult<R>> + Send,
        R: Send,
    {
        let outcome = mutation(Arc::clone(&self.store)).await?;

        match self.cache.invalidate(id).await {
            Ok(()) => debug!(kind = %self.cache.kind(), id, "invalidated after write"),
            Err(e) => warn!(
                kind = %self.cache.kind(),
                id,
                error = %e,
                "failed to invalidate after write, entry stays until its TTL elapses"
            ),
        }
        Ok(outcome)
    }
}

impl<T, S: ?Sized, C: ?Sized> Clone for CacheAside<T, S, C> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            store: Arc::clone(&self.store),
        }
    }
}
