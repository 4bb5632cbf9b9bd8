//! In-memory LRU block cache
//!
//! Blocks are keyed by `(filename, offset)` with block-aligned offsets and
//! evicted least-recently-used first once their total size exceeds the byte
//! budget. A single table lock guards the LRU order, the per-file index and the
//! signatures. Each block also carries its own lock, held only while that block
//! is fetched, so concurrent readers of a missing block share one fetch and no
//! reader waits on the table lock during remote I/O.

use std::collections::{BTreeSet, HashMap};
use std::ops::{Bound, Range};
use std::sync::{Arc, Mutex, RwLock};

use lru::LruCache;
use tracing::{debug, info, trace, warn};

use super::clock::{Clock, SystemClock};
use super::{BlockCache, CacheStats};
use crate::error::CacheError;
use crate::remote::FetchError;

/// Fetches `buf.len()` bytes of `filename` at `offset` on a cache miss
///
/// Returns the number of bytes written to `buf`. A short count is a successful
/// read that reached the end of the file.
pub type BlockFetcher = Box<dyn Fn(&str, u64, &mut [u8]) -> Result<usize, FetchError> + Send + Sync>;

type BlockKey = (String, u64);

enum FetchState {
    Pending,
    Finished(Arc<Vec<u8>>),
}

struct Block {
    state: Mutex<FetchState>,
}

impl Block {
    fn new() -> Self {
        Self {
            state: Mutex::new(FetchState::Pending),
        }
    }
}

/// Table entry for a block
struct Entry {
    block: Arc<Block>,
    /// Insertion time, refreshed when the fetch completes
    timestamp: u64,
    /// Bytes held; 0 until the fetch completes
    size: usize,
    /// Set once the fetch completes; only finished blocks can go stale
    finished: bool,
}

/// Everything guarded by the table lock
struct Blocks {
    lru: LruCache<BlockKey, Entry>,
    /// Cached offsets per file, for file-wide removal and ordering checks
    by_file: HashMap<String, BTreeSet<u64>>,
    signatures: HashMap<String, i64>,
    cache_size: usize,
}

impl Blocks {
    fn new() -> Self {
        Self {
            lru: LruCache::unbounded(),
            by_file: HashMap::new(),
            signatures: HashMap::new(),
            cache_size: 0,
        }
    }

    fn insert(&mut self, key: BlockKey, entry: Entry) {
        self.by_file.entry(key.0.clone()).or_default().insert(key.1);
        if let Some((_, replaced)) = self.lru.push(key, entry) {
            self.cache_size -= replaced.size;
        }
    }

    fn unindex(&mut self, filename: &str, offset: u64) {
        if let Some(offsets) = self.by_file.get_mut(filename) {
            offsets.remove(&offset);
            if offsets.is_empty() {
                self.by_file.remove(filename);
            }
        }
    }

    fn remove(&mut self, key: &BlockKey) {
        if let Some(entry) = self.lru.pop(key) {
            self.cache_size -= entry.size;
            self.unindex(&key.0, key.1);
        }
    }

    /// Drop every block of `filename`, returning how many were removed
    fn remove_file_blocks(&mut self, filename: &str) -> usize {
        let Some(offsets) = self.by_file.remove(filename) else {
            return 0;
        };
        let count = offsets.len();
        for offset in offsets {
            if let Some(entry) = self.lru.pop(&(filename.to_string(), offset)) {
                self.cache_size -= entry.size;
            }
        }
        count
    }

    /// Record a completed fetch, unless the block was dropped meanwhile
    fn commit(&mut self, key: &BlockKey, block: &Arc<Block>, size: usize, now: u64) {
        match self.lru.peek_mut(key) {
            Some(entry) if Arc::ptr_eq(&entry.block, block) => {
                entry.size = size;
                entry.timestamp = now;
                entry.finished = true;
                self.cache_size += size;
            }
            _ => {}
        }
    }

    /// Drop the entry for a failed fetch so the next read retries it
    fn discard(&mut self, key: &BlockKey, block: &Arc<Block>) {
        let current = matches!(self.lru.peek(key), Some(entry) if Arc::ptr_eq(&entry.block, block));
        if current {
            self.remove(key);
        }
    }

    /// Mark a served block as most recently used
    ///
    /// A short block is the end of its file, so a non-empty block of the same
    /// file at a higher offset means the cached contents disagree.
    fn touch(&mut self, key: &BlockKey, block: &Arc<Block>, partial: bool) -> Result<(), CacheError> {
        match self.lru.get(key) {
            Some(entry) if Arc::ptr_eq(&entry.block, block) => {}
            _ => return Ok(()),
        }
        if partial && self.has_data_after(&key.0, key.1) {
            return Err(CacheError::FailedPrecondition {
                filename: key.0.clone(),
                offset: key.1,
            });
        }
        Ok(())
    }

    fn has_data_after(&self, filename: &str, offset: u64) -> bool {
        let Some(offsets) = self.by_file.get(filename) else {
            return false;
        };
        offsets
            .range((Bound::Excluded(offset), Bound::Unbounded))
            .any(|o| {
                self.lru
                    .peek(&(filename.to_string(), *o))
                    .map_or(false, |entry| entry.size > 0)
            })
    }

    /// Evict least-recently-used blocks until within `max_bytes`
    fn trim(&mut self, max_bytes: usize) {
        while self.cache_size > max_bytes {
            let Some((key, entry)) = self.lru.pop_lru() else {
                break;
            };
            self.cache_size -= entry.size;
            self.unindex(&key.0, key.1);
            debug!(file = %key.0, offset = key.1, size = entry.size, "Evicted block");
        }
    }

    fn clear(&mut self) {
        self.lru.clear();
        self.by_file.clear();
        self.signatures.clear();
        self.cache_size = 0;
    }
}

/// LRU block cache held in memory
///
/// Parameters are fixed at construction. The stats observer is borrowed, not
/// owned: the caller keeps it alive for as long as the cache (`'s`).
pub struct RamBlockCache<'s> {
    block_size: usize,
    max_bytes: usize,
    max_staleness: u64,
    fetcher: BlockFetcher,
    clock: Arc<dyn Clock>,
    blocks: Mutex<Blocks>,
    stats: RwLock<Option<&'s dyn CacheStats>>,
}

impl<'s> RamBlockCache<'s> {
    /// Create a block cache
    ///
    /// # Arguments
    /// * `block_size` - Size of each block in bytes (0 disables caching)
    /// * `max_bytes` - Byte budget for cached blocks (0 disables caching)
    /// * `max_staleness` - Maximum block age in seconds (0 = no expiry)
    /// * `fetcher` - Called to load a block on a miss
    pub fn new<F>(block_size: usize, max_bytes: usize, max_staleness: u64, fetcher: F) -> Self
    where
        F: Fn(&str, u64, &mut [u8]) -> Result<usize, FetchError> + Send + Sync + 'static,
    {
        Self::with_clock(block_size, max_bytes, max_staleness, fetcher, Arc::new(SystemClock))
    }

    /// Create a block cache with a custom time source
    pub fn with_clock<F>(
        block_size: usize,
        max_bytes: usize,
        max_staleness: u64,
        fetcher: F,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        F: Fn(&str, u64, &mut [u8]) -> Result<usize, FetchError> + Send + Sync + 'static,
    {
        info!(
            block_size = block_size,
            max_bytes = max_bytes,
            max_staleness = max_staleness,
            "Block cache initialized"
        );

        Self {
            block_size,
            max_bytes,
            max_staleness,
            fetcher: Box::new(fetcher),
            clock,
            blocks: Mutex::new(Blocks::new()),
            stats: RwLock::new(None),
        }
    }

    /// Attach a stats observer and call its `configure` hook
    ///
    /// `None` is rejected with a warning and leaves any current observer in place.
    pub fn set_stats(&self, stats: Option<&'s dyn CacheStats>) {
        let Some(stats) = stats else {
            warn!("Attempted to monitor a missing stats object; block cache metrics will not be exported");
            return;
        };
        *self.stats.write().unwrap() = Some(stats);
        stats.configure(self);
    }

    fn observer(&self) -> Option<&'s dyn CacheStats> {
        *self.stats.read().unwrap()
    }

    fn is_fresh(&self, entry: &Entry, now: u64) -> bool {
        !entry.finished
            || self.max_staleness == 0
            || now.saturating_sub(entry.timestamp) <= self.max_staleness
    }

    /// Find the block for `key`, inserting an unfetched one if absent or stale
    fn lookup(&self, key: &BlockKey) -> Arc<Block> {
        let now = self.clock.now_secs();
        let mut blocks = self.blocks.lock().unwrap();

        let found = blocks
            .lru
            .peek(key)
            .map(|entry| (Arc::clone(&entry.block), self.is_fresh(entry, now)));
        match found {
            Some((block, true)) => return block,
            Some((_, false)) => {
                let removed = blocks.remove_file_blocks(&key.0);
                debug!(file = %key.0, offset = key.1, removed = removed, "Stale block, dropped cached file");
            }
            None => {}
        }

        let block = Arc::new(Block::new());
        blocks.insert(
            key.clone(),
            Entry {
                block: Arc::clone(&block),
                timestamp: now,
                size: 0,
                finished: false,
            },
        );
        block
    }

    /// Return the block's data, fetching it first if needed
    fn maybe_fetch(&self, key: &BlockKey, block: &Arc<Block>) -> Result<Arc<Vec<u8>>, CacheError> {
        let mut state = block.state.lock().unwrap();
        if let FetchState::Finished(data) = &*state {
            trace!(file = %key.0, offset = key.1, "Block cache HIT");
            if let Some(stats) = self.observer() {
                stats.record_cache_hit_block_size(data.len());
            }
            return Ok(Arc::clone(data));
        }

        debug!(file = %key.0, offset = key.1, "Block cache MISS, fetching");
        let mut buf = vec![0u8; self.block_size];
        match (self.fetcher)(&key.0, key.1, &mut buf) {
            Ok(n) => {
                buf.truncate(n.min(self.block_size));
                buf.shrink_to_fit();
                let data = Arc::new(buf);
                *state = FetchState::Finished(Arc::clone(&data));
                drop(state);

                if let Some(stats) = self.observer() {
                    stats.record_cache_miss_block_size(data.len());
                }
                let now = self.clock.now_secs();
                let mut blocks = self.blocks.lock().unwrap();
                blocks.commit(key, block, data.len(), now);
                blocks.trim(self.max_bytes);
                Ok(data)
            }
            Err(e) => {
                drop(state);
                debug!(file = %key.0, offset = key.1, error = %e, "Block fetch failed");
                self.blocks.lock().unwrap().discard(key, block);
                Err(e.into())
            }
        }
    }

    /// Bump the block in LRU order, check consistency and enforce the budget
    fn update_lru(&self, key: &BlockKey, block: &Arc<Block>, size: usize) -> Result<(), CacheError> {
        let mut blocks = self.blocks.lock().unwrap();
        let result = blocks.touch(key, block, size < self.block_size);
        blocks.trim(self.max_bytes);
        result
    }

    /// Read straight from the fetcher when caching is disabled
    fn read_uncached(&self, filename: &str, offset: u64, buffer: &mut [u8]) -> Result<usize, CacheError> {
        let mut scratch = vec![0u8; buffer.len()];
        let fetched = (self.fetcher)(filename, offset, &mut scratch)?.min(buffer.len());
        if fetched == 0 {
            return Err(CacheError::OutOfRange {
                filename: filename.to_string(),
                offset,
                position: offset,
            });
        }
        buffer[..fetched].copy_from_slice(&scratch[..fetched]);
        Ok(fetched)
    }
}

impl BlockCache for RamBlockCache<'_> {
    fn read(&self, filename: &str, offset: u64, buffer: &mut [u8]) -> Result<usize, CacheError> {
        let n = buffer.len();
        if n == 0 {
            return Ok(0);
        }
        if filename.is_empty() {
            return Err(CacheError::InvalidArgument("empty filename".to_string()));
        }
        if !self.is_cache_enabled() {
            return self.read_uncached(filename, offset, buffer);
        }

        let end = offset.checked_add(n as u64).ok_or_else(|| {
            CacheError::InvalidArgument(format!("read of {} bytes at offset {} overflows", n, offset))
        })?;
        let block_size = self.block_size as u64;

        // Collected first so the buffer stays untouched if any block fails
        let mut pieces: Vec<(Arc<Vec<u8>>, Range<usize>)> = Vec::new();
        let mut pos = offset - offset % block_size;
        while pos < end {
            let key = (filename.to_string(), pos);
            let block = self.lookup(&key);
            let data = self.maybe_fetch(&key, &block)?;
            self.update_lru(&key, &block, data.len())?;

            let block_end = pos + data.len() as u64;
            if offset >= block_end {
                return Err(CacheError::OutOfRange {
                    filename: filename.to_string(),
                    offset,
                    position: pos,
                });
            }

            let begin = offset.saturating_sub(pos) as usize;
            let stop = (end.min(block_end) - pos) as usize;
            let short = data.len() < self.block_size;
            if begin < stop {
                pieces.push((data, begin..stop));
            }
            if short {
                break;
            }
            pos = match pos.checked_add(block_size) {
                Some(next) => next,
                None => break,
            };
        }

        let mut copied = 0;
        for (data, range) in pieces {
            let len = range.len();
            buffer[copied..copied + len].copy_from_slice(&data[range]);
            copied += len;
        }
        Ok(copied)
    }

    fn validate_and_update_file_signature(&self, filename: &str, signature: i64) -> bool {
        let mut blocks = self.blocks.lock().unwrap();
        match blocks.signatures.insert(filename.to_string(), signature) {
            Some(previous) if previous != signature => {
                let removed = blocks.remove_file_blocks(filename);
                debug!(
                    file = filename,
                    previous = previous,
                    signature = signature,
                    removed = removed,
                    "File signature changed, invalidated cached blocks"
                );
                false
            }
            _ => true,
        }
    }

    fn remove_file(&self, filename: &str) {
        let mut blocks = self.blocks.lock().unwrap();
        let removed = blocks.remove_file_blocks(filename);
        blocks.signatures.remove(filename);
        debug!(file = filename, removed = removed, "Removed file from block cache");
    }

    fn flush(&self) {
        self.blocks.lock().unwrap().clear();
        debug!("Flushed block cache");
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn max_staleness(&self) -> u64 {
        self.max_staleness
    }

    fn cache_size(&self) -> usize {
        self.blocks.lock().unwrap().cache_size
    }

    fn is_cache_enabled(&self) -> bool {
        self.block_size > 0 && self.max_bytes > 0
    }
}
