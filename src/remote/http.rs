//! HTTP object store
//!
//! Serves objects from a base URL using HEAD for metadata and ranged GETs for
//! content. Calls are blocking: the store drives its own tokio runtime, so it
//! must not be used from inside another runtime's async context.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, ETAG, LAST_MODIFIED, RANGE};
use reqwest::{Client, StatusCode};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::{signature_of, FetchError, ObjectStat, ObjectStore};

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Object store over plain HTTP(S) range requests
pub struct HttpStore {
    /// HTTP client for making requests
    client: Client,
    /// URL prefix that object names are appended to
    base_url: String,
    /// Runtime driving the async client
    runtime: Runtime,
}

impl HttpStore {
    /// Create a store for objects under `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;

        info!(base_url = base_url, "HTTP object store initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            runtime,
        })
    }

    fn object_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.trim_start_matches('/'))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: reqwest::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Inclusive byte range header value for `len` bytes at `offset`
fn range_header(offset: u64, len: usize) -> String {
    let last = offset.saturating_add(len as u64 - 1);
    format!("bytes={}-{}", offset, last)
}

impl HttpStore {
    /// Fetch object metadata with a HEAD request
    async fn head(&self, name: &str) -> Result<ObjectStat, FetchError> {
        let url = self.object_url(name);
        let response = self.client.head(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16(), name));
        }

        let headers = response.headers();
        let size = header_str(headers, CONTENT_LENGTH)
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| FetchError::Request(format!("Missing Content-Length for {}", name)))?;
        let etag = header_str(headers, ETAG).unwrap_or_default();
        let modified = header_str(headers, LAST_MODIFIED).unwrap_or_default();

        debug!(name = name, size = size, etag = etag, "Fetched object metadata");

        Ok(ObjectStat {
            size,
            signature: signature_of((etag, modified, size)),
        })
    }

    /// Download up to `buf.len()` bytes at `offset` with a ranged GET
    async fn get_range(&self, name: &str, offset: u64, buf: &mut [u8]) -> Result<usize, FetchError> {
        let url = self.object_url(name);
        let range = range_header(offset, buf.len());
        let response = self.client.get(&url).header(RANGE, &range).send().await?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                let bytes = response.bytes().await?;
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                debug!(name = name, range = %range, bytes = n, "Downloaded range");
                Ok(n)
            }
            // Server ignored the Range header and sent the whole object
            StatusCode::OK => {
                let bytes = response.bytes().await?;
                let start = offset.min(bytes.len() as u64) as usize;
                let n = (bytes.len() - start).min(buf.len());
                buf[..n].copy_from_slice(&bytes[start..start + n]);
                debug!(name = name, range = %range, bytes = n, "Downloaded full object for range");
                Ok(n)
            }
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(0),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(FetchError::from_status(status.as_u16(), &body))
            }
        }
    }
}

impl ObjectStore for HttpStore {
    fn stat(&self, name: &str) -> Result<ObjectStat, FetchError> {
        self.runtime.block_on(self.head(name))
    }

    fn read_range(&self, name: &str, offset: u64, buf: &mut [u8]) -> Result<usize, FetchError> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.runtime.block_on(self.get_range(name, offset, buf))
    }
}
