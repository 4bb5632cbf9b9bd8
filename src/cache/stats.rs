//! Block cache hit/miss counters

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use tracing::debug;

use super::{BlockCache, CacheStats};

/// Lock-free counters implementing [`CacheStats`]
#[derive(Debug, Default)]
pub struct CacheCounters {
    hit_blocks: AtomicU64,
    hit_bytes: AtomicU64,
    miss_blocks: AtomicU64,
    miss_bytes: AtomicU64,
    /// Parameters of the cache this observer was last attached to
    block_size: AtomicUsize,
    max_bytes: AtomicUsize,
    enabled: AtomicBool,
    configured: AtomicU64,
}

/// Point-in-time copy of [`CacheCounters`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountersSnapshot {
    pub hit_blocks: u64,
    pub hit_bytes: u64,
    pub miss_blocks: u64,
    pub miss_bytes: u64,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            hit_blocks: self.hit_blocks.load(Ordering::Relaxed),
            hit_bytes: self.hit_bytes.load(Ordering::Relaxed),
            miss_blocks: self.miss_blocks.load(Ordering::Relaxed),
            miss_bytes: self.miss_bytes.load(Ordering::Relaxed),
        }
    }

    /// Percentage of served blocks that were cache hits
    pub fn hit_rate(&self) -> f64 {
        let s = self.snapshot();
        let total = s.hit_blocks + s.miss_blocks;
        if total > 0 {
            (s.hit_blocks as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Number of times `configure` has been called
    pub fn configured_count(&self) -> u64 {
        self.configured.load(Ordering::Relaxed)
    }

    /// Block size of the cache this observer is attached to
    pub fn block_size(&self) -> usize {
        self.block_size.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.hit_blocks.store(0, Ordering::Relaxed);
        self.hit_bytes.store(0, Ordering::Relaxed);
        self.miss_blocks.store(0, Ordering::Relaxed);
        self.miss_bytes.store(0, Ordering::Relaxed);
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let s = self.snapshot();
        debug!(
            hit_blocks = s.hit_blocks,
            hit_bytes = s.hit_bytes,
            miss_blocks = s.miss_blocks,
            miss_bytes = s.miss_bytes,
            hit_rate = format!("{:.1}%", self.hit_rate()),
            block_size = self.block_size.load(Ordering::Relaxed),
            max_bytes = self.max_bytes.load(Ordering::Relaxed),
            enabled = self.enabled.load(Ordering::Relaxed),
            "Block cache metrics"
        );
    }
}

impl CacheStats for CacheCounters {
    fn configure(&self, cache: &dyn BlockCache) {
        self.block_size.store(cache.block_size(), Ordering::Relaxed);
        self.max_bytes.store(cache.max_bytes(), Ordering::Relaxed);
        self.enabled.store(cache.is_cache_enabled(), Ordering::Relaxed);
        self.configured.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_hit_block_size(&self, bytes: usize) {
        self.hit_blocks.fetch_add(1, Ordering::Relaxed);
        self.hit_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_cache_miss_block_size(&self, bytes: usize) {
        self.miss_blocks.fetch_add(1, Ordering::Relaxed);
        self.miss_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let counters = CacheCounters::new();
        assert_eq!(counters.hit_rate(), 0.0);

        counters.record_cache_miss_block_size(4096);
        counters.record_cache_hit_block_size(4096);
        counters.record_cache_hit_block_size(100);
        counters.record_cache_hit_block_size(100);

        let s = counters.snapshot();
        assert_eq!(s.hit_blocks, 3);
        assert_eq!(s.hit_bytes, 4296);
        assert_eq!(s.miss_blocks, 1);
        assert_eq!(counters.hit_rate(), 75.0);

        counters.reset();
        assert_eq!(counters.snapshot(), CountersSnapshot::default());
    }
}
