//! In-process cache backend.
//!
//! Backs the cache with a [`DashMap`] so concurrent readers and writers on
//! different keys never contend on a single lock. Expiry is checked lazily on
//! read; `purge_expired` sweeps the whole map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use shutter_core::{CacheError, ShutterResult};

use super::key::CacheKey;
use super::traits::{clamp_ttl, CacheStats, CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache backend living in process memory.
///
/// Only suitable when a single instance serves all traffic, or for tests.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<CacheKey, Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` currently holds a live entry. Does not touch statistics.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> u64 {
        let now = Instant::now();
        let mut removed = 0u64;
        self.entries.retain(|_, entry| {
            let expired = entry.is_expired(now);
            if expired {
                removed += 1;
            }
            !expired
        });
        self.expirations.fetch_add(removed, Ordering::Relaxed);
        removed
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> ShutterResult<Option<Vec<u8>>> {
        let now = Instant::now();
        // Clone out before removing so no shard guard is held across remove.
        let found = self.entries.get(key).map(|entry| entry.value().clone());

        match found {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.bytes))
            }
            Some(_) => {
                // Only remove if nobody replaced it in the meantime.
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired(now))
                    .is_some()
                {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> ShutterResult<()> {
        let expires_at = Instant::now()
            .checked_add(clamp_ttl(ttl))
            .ok_or_else(|| CacheError::Backend {
                reason: format!("ttl {ttl:?} overflows the clock"),
            })?;
        self.entries.insert(
            key.clone(),
            Entry {
                bytes: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> ShutterResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn stats(&self) -> ShutterResult<CacheStats> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }
}
