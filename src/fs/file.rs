//! Remote File Handles
//!
//! A handle to one remote object, reading through the shared block cache.
//! Each open() on the filesystem creates one; dropping it releases nothing
//! remote.

use std::io::{self, Read, Seek, SeekFrom};

use tracing::trace;

use crate::cache::BlockCache;
use crate::error::CacheError;
use crate::remote::ObjectStat;

/// Read-only random-access handle to a remote object
pub struct RemoteFile<'a> {
    /// Block cache shared by all handles of the filesystem
    cache: &'a dyn BlockCache,
    /// Object name within the store
    name: String,
    /// Size and signature observed when the handle was opened
    stat: ObjectStat,
    /// Cursor for the `Read`/`Seek` impls
    position: u64,
}

impl<'a> RemoteFile<'a> {
    pub(crate) fn new(cache: &'a dyn BlockCache, name: &str, stat: ObjectStat) -> Self {
        Self {
            cache,
            name: name.to_string(),
            stat,
            position: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Object size when the handle was opened
    pub fn size(&self) -> u64 {
        self.stat.size
    }

    pub fn signature(&self) -> i64 {
        self.stat.signature
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read into `buf` at `offset` without moving the cursor
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, CacheError> {
        self.cache.read(&self.name, offset, buf)
    }
}

impl Read for RemoteFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.cache.read(&self.name, self.position, buf) {
            Ok(n) => {
                self.position += n as u64;
                trace!(name = %self.name, bytes = n, position = self.position, "Read from remote file");
                Ok(n)
            }
            Err(e) if e.is_out_of_range() => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl Seek for RemoteFile<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(offset) => {
                self.position = offset;
                return Ok(offset);
            }
            SeekFrom::End(delta) => (self.stat.size, delta),
            SeekFrom::Current(delta) => (self.position, delta),
        };
        match base.checked_add_signed(delta) {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
