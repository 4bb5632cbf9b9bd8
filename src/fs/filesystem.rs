//! Cached Remote Filesystem
//!
//! Fronts an object store with a stat cache and a shared block cache. Opening
//! a file revalidates its signature, dropping cached blocks of objects that
//! changed remotely.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::file::RemoteFile;
use crate::cache::{BlockCache, CacheStats, RamBlockCache, StatCache};
use crate::config::{CacheConfig, RetryConfig};
use crate::remote::{with_retry, FetchError, ObjectStat, ObjectStore};

/// Read-only filesystem over a remote object store
pub struct CachedFileSystem<'s> {
    /// Backing object store
    store: Arc<dyn ObjectStore>,
    /// Block cache shared by all open files
    cache: RamBlockCache<'s>,
    /// Object metadata by name
    stat_cache: StatCache,
    /// Retry policy for stat calls
    retry: RetryConfig,
}

impl<'s> CachedFileSystem<'s> {
    /// Create a filesystem over `store`
    ///
    /// Block fetches and stats go through the configured retry policy.
    pub fn new(store: Arc<dyn ObjectStore>, config: &CacheConfig) -> Self {
        let fetch_store = Arc::clone(&store);
        let fetch_retry = config.retry.clone();
        let cache = RamBlockCache::new(
            config.block_size,
            config.max_bytes,
            config.max_staleness,
            move |name: &str, offset: u64, buf: &mut [u8]| {
                with_retry(&fetch_retry, "read_range", name, || {
                    fetch_store.read_range(name, offset, buf)
                })
            },
        );

        let stat_cache = StatCache::new(
            Duration::from_secs(config.stat_cache_max_age),
            config.stat_cache_max_entries,
        );

        info!(
            block_cache = cache.is_cache_enabled(),
            stat_cache = stat_cache.is_enabled(),
            "Cached filesystem initialized"
        );

        Self {
            store,
            cache,
            stat_cache,
            retry: config.retry.clone(),
        }
    }

    pub fn block_cache(&self) -> &RamBlockCache<'s> {
        &self.cache
    }

    pub fn stat_cache(&self) -> &StatCache {
        &self.stat_cache
    }

    /// Attach a stats observer to the block cache
    pub fn set_stats(&self, stats: &'s dyn CacheStats) {
        self.cache.set_stats(Some(stats));
    }

    /// Size and signature of `name`, from the stat cache when fresh
    pub fn stat(&self, name: &str) -> Result<ObjectStat, FetchError> {
        self.stat_cache.get_or_fetch(name, || {
            with_retry(&self.retry, "stat", name, || self.store.stat(name))
        })
    }

    /// Open `name` for reading
    ///
    /// Cached blocks of `name` are dropped if its signature changed since the
    /// last open.
    pub fn open(&self, name: &str) -> Result<RemoteFile<'_>, FetchError> {
        let stat = self.stat(name)?;
        if !self.cache.validate_and_update_file_signature(name, stat.signature) {
            debug!(name = name, "Object changed remotely, cached blocks dropped");
        }
        Ok(RemoteFile::new(&self.cache, name, stat))
    }

    /// Forget everything cached about `name`
    pub fn invalidate(&self, name: &str) {
        self.stat_cache.invalidate(name);
        self.cache.remove_file(name);
        debug!(name = name, "Invalidated cached object");
    }

    /// Drop all cached metadata and blocks
    pub fn flush(&self) {
        self.stat_cache.clear();
        self.cache.flush();
        debug!("Flushed filesystem caches");
    }
}
