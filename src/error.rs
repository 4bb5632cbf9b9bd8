//! Block cache read outcomes

use std::io;

use crate::remote::FetchError;

/// Errors returned by [`crate::cache::BlockCache::read`]
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The fetch callback failed; its error is passed through unchanged.
    #[error(transparent)]
    Remote(#[from] FetchError),

    /// A short block was served while a later block of the same file is cached.
    #[error("Block cache contents are inconsistent: partial block at offset {offset} in file {filename} precedes a cached block")]
    FailedPrecondition { filename: String, offset: u64 },

    /// The requested offset is at or past the end of the file.
    #[error("EOF at offset {offset} in file {filename} at position {position}")]
    OutOfRange {
        filename: String,
        offset: u64,
        position: u64,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CacheError {
    /// Whether this outcome marks the end of the file
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, CacheError::OutOfRange { .. })
    }
}

impl From<CacheError> for io::Error {
    fn from(err: CacheError) -> Self {
        let kind = match &err {
            CacheError::Remote(FetchError::NotFound(_)) => io::ErrorKind::NotFound,
            CacheError::Remote(FetchError::PermissionDenied(_)) => io::ErrorKind::PermissionDenied,
            CacheError::Remote(FetchError::Timeout) => io::ErrorKind::TimedOut,
            CacheError::Remote(_) => io::ErrorKind::Other,
            CacheError::FailedPrecondition { .. } => io::ErrorKind::InvalidData,
            CacheError::OutOfRange { .. } => io::ErrorKind::UnexpectedEof,
            CacheError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_is_verbatim() {
        let err = CacheError::from(FetchError::NotFound("bucket/obj".to_string()));
        assert_eq!(err.to_string(), "Not found: bucket/obj");
        assert!(!err.is_out_of_range());
    }

    #[test]
    fn test_io_conversion() {
        let err = CacheError::OutOfRange {
            filename: "f".to_string(),
            offset: 10,
            position: 8,
        };
        assert!(err.is_out_of_range());
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
