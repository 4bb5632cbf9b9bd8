//! Remote object stores
//!
//! An object store serves byte ranges of named objects. The block cache only
//! needs `read_range`; `stat` supplies the size and version signature used by
//! the file layer.

pub mod errors;
pub mod http;
pub mod local;
pub mod retry;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub use errors::FetchError;
pub use http::HttpStore;
pub use local::LocalStore;
pub use retry::with_retry;

/// Size and version of a remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectStat {
    /// Object length in bytes
    pub size: u64,
    /// Opaque version marker; changes whenever the content changes
    pub signature: i64,
}

/// A byte-addressable remote object store
pub trait ObjectStore: Send + Sync {
    /// Look up the size and signature of `name`
    fn stat(&self, name: &str) -> Result<ObjectStat, FetchError>;

    /// Read up to `buf.len()` bytes of `name` starting at `offset`
    ///
    /// Like read(2): returns fewer bytes at the end of the object and 0 at or
    /// past it.
    fn read_range(&self, name: &str, offset: u64, buf: &mut [u8]) -> Result<usize, FetchError>;
}

/// Derive a signature from version attributes
pub(crate) fn signature_of<T: Hash>(parts: T) -> i64 {
    let mut hasher = DefaultHasher::new();
    parts.hash(&mut hasher);
    hasher.finish() as i64
}
