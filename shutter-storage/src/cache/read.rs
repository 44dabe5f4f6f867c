//! Result of a cache-aside read.

use chrono::{DateTime, Utc};

/// A value returned by a cache-aside read, tagged with where it came from.
///
/// Callers that care about freshness can inspect [`was_cache_hit`]; a hit
/// may be as old as the cache TTL. Everyone else just calls [`into_value`].
///
/// [`was_cache_hit`]: CachedRead::was_cache_hit
/// [`into_value`]: CachedRead::into_value
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRead<T> {
    value: T,
    /// When this read completed. Says nothing about when a cached entry
    /// was written.
    read_at: DateTime<Utc>,
    cache_hit: bool,
}

impl<T> CachedRead<T> {
    /// A value served from the cache.
    pub fn from_cache(value: T) -> Self {
        Self {
            value,
            read_at: Utc::now(),
            cache_hit: true,
        }
    }

    /// A value fetched from the durable store after a miss.
    pub fn from_store(value: T) -> Self {
        Self {
            value,
            read_at: Utc::now(),
            cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn was_cache_hit(&self) -> bool {
        self.cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.cache_hit
    }

    /// When the read completed, not the age of the cached entry.
    pub fn read_at(&self) -> DateTime<Utc> {
        self.read_at
    }

    /// Split into the value and the hit flag.
    pub fn into_parts(self) -> (T, bool) {
        (self.value, self.cache_hit)
    }

    pub fn map<U, F>(self, f: F) -> CachedRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CachedRead {
            value: f(self.value),
            read_at: self.read_at,
            cache_hit: self.cache_hit,
        }
    }
}

impl<T> AsRef<T> for CachedRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss_flags() {
        let hit = CachedRead::from_cache(1u32);
        assert!(hit.was_cache_hit());
        assert!(!hit.was_cache_miss());

        let miss = CachedRead::from_store(2u32);
        assert!(miss.was_cache_miss());
        assert_eq!(miss.into_parts(), (2, false));
    }

    #[test]
    fn test_map_keeps_metadata() {
        let read = CachedRead::from_cache(21u32);
        let read_at = read.read_at();
        let doubled = read.map(|v| v * 2);
        assert_eq!(*doubled.value(), 42);
        assert!(doubled.was_cache_hit());
        assert_eq!(doubled.read_at(), read_at);
    }

    #[test]
    fn test_read_at_is_the_time_of_the_read() {
        let before = Utc::now();
        let read = CachedRead::from_cache("cached long ago");
        assert!(read.read_at() >= before);
        assert!(read.read_at() <= Utc::now());
    }
}
