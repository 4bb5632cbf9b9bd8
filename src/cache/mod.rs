//! Caching layer
//!
//! A block-granular read cache for remote files, plus an expiring cache of
//! object metadata used to decide when cached blocks must be invalidated.

pub mod clock;
pub mod ram;
pub mod stat_cache;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ram::{BlockFetcher, RamBlockCache};
pub use stat_cache::StatCache;
pub use stats::CacheCounters;

use crate::error::CacheError;

/// A cache of file contents keyed by `(filename, block offset)`
///
/// Shared by all read handles of a remote filesystem, so every method must be
/// callable concurrently.
pub trait BlockCache: Send + Sync {
    /// Read `buffer.len()` bytes of `filename` starting at `offset`
    ///
    /// Returns the number of bytes placed in `buffer`, which is at least 1
    /// unless `buffer` is empty. On error `buffer` is left unchanged:
    /// - `Remote` carries the fetch callback's error verbatim
    /// - `FailedPrecondition` if a short block was served while a block at a
    ///   higher offset of the same file is cached
    /// - `OutOfRange` if the file does not extend past `offset`
    fn read(&self, filename: &str, offset: u64, buffer: &mut [u8]) -> Result<usize, CacheError>;

    /// Compare `signature` with the one recorded for `filename`
    ///
    /// Returns true if unchanged or previously unknown. Otherwise records the
    /// new signature, drops every cached block of the file and returns false.
    fn validate_and_update_file_signature(&self, filename: &str, signature: i64) -> bool;

    /// Remove all cached blocks and the recorded signature of `filename`
    fn remove_file(&self, filename: &str);

    /// Remove all cached data and recorded signatures
    fn flush(&self);

    fn block_size(&self) -> usize;
    fn max_bytes(&self) -> usize;
    fn max_staleness(&self) -> u64;

    /// Total bytes of cached block contents
    fn cache_size(&self) -> usize;

    /// When false every read goes straight to the fetch callback
    fn is_cache_enabled(&self) -> bool;
}

/// Observer for block cache hits and misses
///
/// Implementations are called from every reading thread and must be
/// thread-safe.
pub trait CacheStats: Send + Sync {
    /// Called when the observer is attached to `cache`; may happen more than once
    fn configure(&self, cache: &dyn BlockCache);

    /// A block of `bytes` was served from the cache
    fn record_cache_hit_block_size(&self, bytes: usize);

    /// A block of `bytes` was fetched from the remote store
    fn record_cache_miss_block_size(&self, bytes: usize);
}
