//! Directory-backed object store

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::trace;

use super::{signature_of, FetchError, ObjectStat, ObjectStore};

/// Serves objects from files under a root directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an object name to a path under the root
    fn resolve(&self, name: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(FetchError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalStore {
    fn stat(&self, name: &str) -> Result<ObjectStat, FetchError> {
        let metadata = fs::metadata(self.resolve(name)?)?;
        if !metadata.is_file() {
            return Err(FetchError::NotFound(name.to_string()));
        }
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default()
            .as_nanos();
        Ok(ObjectStat {
            size: metadata.len(),
            signature: signature_of((mtime, metadata.len())),
        })
    }

    fn read_range(&self, name: &str, offset: u64, buf: &mut [u8]) -> Result<usize, FetchError> {
        let mut file = File::open(self.resolve(name)?)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        trace!(name = name, offset = offset, bytes = filled, "Read range from local store");
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(name: &str, content: &[u8]) -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(name), content).unwrap();
        let store = LocalStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_read_range() {
        let (_dir, store) = store_with("obj", b"hello world");

        let mut buf = [0u8; 5];
        assert_eq!(store.read_range("obj", 6, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");

        // Short read at the end, empty read past it
        let mut buf = [0u8; 8];
        assert_eq!(store.read_range("obj", 8, &mut buf).unwrap(), 3);
        assert_eq!(store.read_range("obj", 20, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_stat_tracks_content() {
        let (dir, store) = store_with("obj", b"abc");
        let first = store.stat("obj").unwrap();
        assert_eq!(first.size, 3);

        fs::write(dir.path().join("obj"), b"abcdef").unwrap();
        let second = store.stat("obj").unwrap();
        assert_eq!(second.size, 6);
        assert_ne!(first.signature, second.signature);
    }

    #[test]
    fn test_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(matches!(store.stat("nope"), Err(FetchError::NotFound(_))));
        let mut buf = [0u8; 4];
        assert!(matches!(
            store.read_range("nope", 0, &mut buf),
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn test_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(matches!(store.stat("../etc/passwd"), Err(FetchError::InvalidName(_))));
        assert!(matches!(store.stat("/etc/passwd"), Err(FetchError::InvalidName(_))));
        assert!(matches!(store.stat(""), Err(FetchError::InvalidName(_))));
    }
}
