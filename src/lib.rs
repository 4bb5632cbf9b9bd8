//! cloudblock - block-granular read cache for remote files
//!
//! Serves random-access reads of objects in a remote store through a bounded,
//! LRU-evicted, staleness-aware in-memory block cache.

pub mod cache;
pub mod config;
pub mod error;
pub mod fs;
pub mod remote;

pub use cache::{BlockCache, CacheStats, RamBlockCache};
pub use config::CacheConfig;
pub use error::CacheError;
pub use fs::{CachedFileSystem, RemoteFile};
pub use remote::{FetchError, ObjectStat, ObjectStore};
