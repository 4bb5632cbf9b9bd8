//! Remote Fetch Error Types
//!
//! Structured errors reported by object stores when fetching bytes.
//! Maps HTTP status codes and I/O errors to variants used for retry decisions.

use std::io;

/// Errors reported by an object store
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Operation aborted: {0}")]
    Aborted(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Request timeout")]
    Timeout,

    #[error("Rate limited")]
    RateLimited,

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Invalid object name: {0}")]
    InvalidName(String),
}

impl FetchError {
    /// Whether this error is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Unavailable(_)
                | FetchError::Aborted(_)
                | FetchError::Cancelled
                | FetchError::Timeout
                | FetchError::RateLimited
                | FetchError::Server(_, _)
                | FetchError::Network(_)
        )
    }

    /// Create a FetchError from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => FetchError::PermissionDenied(body.to_string()),
            404 | 410 => FetchError::NotFound(body.to_string()),
            408 => FetchError::Timeout,
            409 => FetchError::Aborted(body.to_string()),
            429 => FetchError::RateLimited,
            503 => FetchError::Unavailable(body.to_string()),
            500..=599 => FetchError::Server(status, body.to_string()),
            _ => FetchError::Request(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<io::Error> for FetchError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FetchError::NotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => FetchError::PermissionDenied(err.to_string()),
            io::ErrorKind::TimedOut => FetchError::Timeout,
            io::ErrorKind::Interrupted => FetchError::Aborted(err.to_string()),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => FetchError::Network(err.to_string()),
            _ => FetchError::Request(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Network(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::from_status(status.as_u16(), &err.to_string())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(FetchError::from_status(404, "gone"), FetchError::NotFound(_)));
        assert!(matches!(FetchError::from_status(403, ""), FetchError::PermissionDenied(_)));
        assert!(matches!(FetchError::from_status(429, ""), FetchError::RateLimited));
        assert!(matches!(FetchError::from_status(503, ""), FetchError::Unavailable(_)));
        assert!(matches!(FetchError::from_status(502, ""), FetchError::Server(502, _)));
        assert!(matches!(FetchError::from_status(400, "bad"), FetchError::Request(_)));
    }

    #[test]
    fn test_retryable() {
        assert!(FetchError::Unavailable("x".into()).is_retryable());
        assert!(FetchError::Aborted("x".into()).is_retryable());
        assert!(FetchError::Cancelled.is_retryable());
        assert!(FetchError::Timeout.is_retryable());
        assert!(!FetchError::NotFound("x".into()).is_retryable());
        assert!(!FetchError::PermissionDenied("x".into()).is_retryable());
        assert!(!FetchError::InvalidName("x".into()).is_retryable());
    }

    #[test]
    fn test_io_mapping() {
        let err: FetchError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, FetchError::NotFound(_)));

        let err: FetchError = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert!(err.is_retryable());
    }
}
