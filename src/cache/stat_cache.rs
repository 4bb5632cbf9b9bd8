//! Object Metadata Cache
//!
//! TTL cache for remote object size and signature using Moka.
//! Bounds how often the file layer has to stat the remote store before
//! revalidating cached blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, trace};

use crate::remote::ObjectStat;

/// Expiring cache of [`ObjectStat`] by object name
///
/// A zero TTL disables the cache: lookups always miss and inserts are dropped.
pub struct StatCache {
    /// Entries by object name; `None` when disabled
    cache: Option<Cache<String, ObjectStat>>,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl StatCache {
    /// Create a stat cache
    ///
    /// # Arguments
    /// * `max_age` - TTL for entries (zero disables the cache)
    /// * `max_entries` - Maximum number of entries
    pub fn new(max_age: Duration, max_entries: u64) -> Self {
        let cache = (!max_age.is_zero() && max_entries > 0).then(|| {
            Cache::builder()
                .time_to_live(max_age)
                .max_capacity(max_entries)
                .name("object_stat_cache")
                .build()
        });

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Get cached metadata for `name`
    pub fn get(&self, name: &str) -> Option<ObjectStat> {
        match self.cache.as_ref().and_then(|c| c.get(name)) {
            Some(stat) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(name = name, "Stat cache HIT");
                Some(stat)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(name = name, "Stat cache MISS");
                None
            }
        }
    }

    pub fn insert(&self, name: &str, stat: ObjectStat) {
        if let Some(cache) = &self.cache {
            cache.insert(name.to_string(), stat);
            debug!(name = name, size = stat.size, "Cached object metadata");
        }
    }

    /// Look up `name`, calling `fetch` and caching its result on a miss
    pub fn get_or_fetch<F, E>(&self, name: &str, fetch: F) -> Result<ObjectStat, E>
    where
        F: FnOnce() -> Result<ObjectStat, E>,
    {
        if let Some(stat) = self.get(name) {
            return Ok(stat);
        }
        let stat = fetch()?;
        self.insert(name, stat);
        Ok(stat)
    }

    pub fn invalidate(&self, name: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(name);
        }
    }

    /// Drop all entries and reset counters
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Returns (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::FetchError;
    use std::thread;

    fn stat(size: u64, signature: i64) -> ObjectStat {
        ObjectStat { size, signature }
    }

    #[test]
    fn test_hit_miss() {
        let cache = StatCache::new(Duration::from_secs(60), 16);
        assert!(cache.get("a").is_none());

        cache.insert("a", stat(10, 1));
        assert_eq!(cache.get("a"), Some(stat(10, 1)));
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_get_or_fetch() {
        let cache = StatCache::new(Duration::from_secs(60), 16);
        let mut calls = 0;
        for _ in 0..3 {
            let result: Result<_, FetchError> = cache.get_or_fetch("a", || {
                calls += 1;
                Ok(stat(5, 7))
            });
            assert_eq!(result.unwrap(), stat(5, 7));
        }
        assert_eq!(calls, 1);

        let err = cache.get_or_fetch("b", || Err(FetchError::NotFound("b".into())));
        assert!(err.is_err());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = StatCache::new(Duration::from_secs(60), 16);
        cache.insert("a", stat(1, 1));
        cache.insert("b", stat(2, 2));

        cache.invalidate("a");
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());

        cache.clear();
        assert!(cache.get("b").is_none());
        assert_eq!(cache.stats(), (0, 1));
    }

    #[test]
    fn test_expiry() {
        let cache = StatCache::new(Duration::from_millis(50), 16);
        cache.insert("a", stat(1, 1));
        thread::sleep(Duration::from_millis(120));
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_disabled() {
        let cache = StatCache::new(Duration::ZERO, 16);
        assert!(!cache.is_enabled());
        cache.insert("a", stat(1, 1));
        assert!(cache.get("a").is_none());
    }
}
