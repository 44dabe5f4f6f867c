//! Cached listing pages.
//!
//! # Bounded staleness
//!
//! Listing pages are NOT invalidated when an individual entity is created,
//! updated or deleted. A cached page may therefore lag the durable store by up
//! to one listing TTL: a new post can be missing from page 1, a deleted post
//! can still show up, and `total` can be off, until the entry expires. Callers
//! that need read-after-write listings must bypass this cache or call
//! [`ListingCache::invalidate`] for the pages they know are affected.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use shutter_core::constants::DEFAULT_CACHE_TTL_SECS;
use shutter_core::{Page, ShutterResult};
use tracing::{debug, warn};

use super::codec;
use super::key::CacheKey;
use super::traits::{CacheStore, Cacheable};

/// Cache of listing pages of `T`, keyed by page number and page size.
pub struct ListingCache<T, C: ?Sized = dyn CacheStore> {
    store: Arc<C>,
    ttl: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C> ListingCache<T, C>
where
    T: Cacheable,
    C: CacheStore + ?Sized,
{
    pub fn new(store: Arc<C>) -> Self {
        Self::with_ttl(store, Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }

    /// `ttl` is also the upper bound on how stale a page may get.
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

    pub fn key_for(page: u32, page_size: u32) -> CacheKey {
        CacheKey::listing(T::kind(), page, page_size)
    }

    /// Cached page, or `None` on a miss. Never fails.
    pub async fn get(&self, page: u32, page_size: u32) -> Option<Page<T>> {
        let key = Self::key_for(page, page_size);

        match self.store.get(&key).await {
            Ok(Some(bytes)) => match codec::decode::<Page<T>>(&key, &bytes) {
                Ok(cached) => {
                    debug!(key = %key, "listing cache hit");
                    Some(cached)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "undecodable listing entry, treating as miss");
                    None
                }
            },
            Ok(None) => {
                debug!(key = %key, "listing cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "listing cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store `page` under the key derived from its page number and size.
    pub async fn put(&self, page: &Page<T>) -> ShutterResult<()> {
        let key = Self::key_for(page.page, page.page_size);
        let bytes = codec::encode(T::kind(), page)?;
        self.store.set(&key, bytes, self.ttl).await?;
        debug!(key = %key, items = page.items.len(), "listing cached");
        Ok(())
    }

    pub async fn invalidate(&self, page: u32, page_size: u32) -> ShutterResult<()> {
        self.store.delete(&Self::key_for(page, page_size)).await
    }
}

impl<T, C: ?Sized> Clone for ListingCache<T, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ttl: self.ttl,
            _marker: PhantomData,
        }
    }
}

impl<T, C: ?Sized> std::fmt::Debug for ListingCache<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListingCache")
            .field("entity", &std::any::type_name::<T>())
            .field("ttl", &self.ttl)
            .finish()
    }
}
