//! Cache configuration
//!
//! Settings are read from an optional JSON file and then overridden by
//! environment variables. The block cache keeps them fixed for its lifetime.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const MIB: usize = 1024 * 1024;

/// Default block size: 64 MiB
pub const DEFAULT_BLOCK_SIZE: usize = 64 * MIB;

/// Default block cache budget: two blocks
pub const DEFAULT_MAX_BYTES: usize = 2 * DEFAULT_BLOCK_SIZE;

/// Default stat cache TTL in seconds
pub const DEFAULT_STAT_CACHE_MAX_AGE: u64 = 5;

/// Default number of stat cache entries
pub const DEFAULT_STAT_CACHE_MAX_ENTRIES: u64 = 1024;

pub const ENV_BLOCK_SIZE_MB: &str = "CLOUDBLOCK_BLOCK_SIZE_MB";
pub const ENV_MAX_SIZE_MB: &str = "CLOUDBLOCK_MAX_SIZE_MB";
pub const ENV_MAX_STALENESS: &str = "CLOUDBLOCK_MAX_STALENESS";
pub const ENV_STAT_CACHE_MAX_AGE: &str = "CLOUDBLOCK_STAT_CACHE_MAX_AGE";
pub const ENV_STAT_CACHE_MAX_ENTRIES: &str = "CLOUDBLOCK_STAT_CACHE_MAX_ENTRIES";

/// Retry policy applied to remote store calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each subsequent one
    pub initial_delay_ms: u64,
    /// Upper bound for a single delay
    pub max_delay_ms: u64,
    /// Total time budget across all attempts
    pub deadline_ms: u64,
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 2000,
            deadline_ms: 30_000,
        }
    }
}

/// Block cache and stat cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Size in bytes of each cached block (0 disables the cache)
    pub block_size: usize,
    /// Byte budget for cached block contents (0 disables the cache)
    pub max_bytes: usize,
    /// Maximum age in seconds of a cached block (0 = never expires)
    pub max_staleness: u64,
    /// TTL in seconds for cached object metadata (0 disables the stat cache)
    pub stat_cache_max_age: u64,
    /// Maximum number of cached object metadata entries
    pub stat_cache_max_entries: u64,
    /// Retry policy for remote calls
    pub retry: RetryConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_bytes: DEFAULT_MAX_BYTES,
            max_staleness: 0,
            stat_cache_max_age: DEFAULT_STAT_CACHE_MAX_AGE,
            stat_cache_max_entries: DEFAULT_STAT_CACHE_MAX_ENTRIES,
            retry: RetryConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from a JSON file
    ///
    /// Missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: CacheConfig = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        debug!(path = %path.display(), "Loaded cache configuration");
        Ok(config)
    }

    /// Override fields from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Override fields from a key lookup; unparsable values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bytes) = parse_mib(&lookup, ENV_BLOCK_SIZE_MB) {
            self.block_size = bytes;
        }
        if let Some(bytes) = parse_mib(&lookup, ENV_MAX_SIZE_MB) {
            self.max_bytes = bytes;
        }
        if let Some(secs) = parse_var(&lookup, ENV_MAX_STALENESS) {
            self.max_staleness = secs;
        }
        if let Some(secs) = parse_var(&lookup, ENV_STAT_CACHE_MAX_AGE) {
            self.stat_cache_max_age = secs;
        }
        if let Some(entries) = parse_var(&lookup, ENV_STAT_CACHE_MAX_ENTRIES) {
            self.stat_cache_max_entries = entries;
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key = key, value = %raw, "Ignoring unparsable configuration override");
            None
        }
    }
}

/// Parse a MiB count into bytes; values too large to represent are ignored
fn parse_mib(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let mb = parse_var::<usize>(lookup, key)?;
    let bytes = mb.checked_mul(MIB);
    if bytes.is_none() {
        warn!(key = key, value = mb, "Ignoring configuration override too large to represent");
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.block_size, 64 * MIB);
        assert_eq!(config.max_bytes, 128 * MIB);
        assert_eq!(config.max_staleness, 0);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_BLOCK_SIZE_MB, "8"),
            (ENV_MAX_SIZE_MB, "32"),
            (ENV_MAX_STALENESS, "60"),
            (ENV_STAT_CACHE_MAX_AGE, "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = CacheConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.block_size, 8 * MIB);
        assert_eq!(config.max_bytes, 32 * MIB);
        assert_eq!(config.max_staleness, 60);
        // Unparsable value leaves the default in place
        assert_eq!(config.stat_cache_max_age, DEFAULT_STAT_CACHE_MAX_AGE);
    }

    #[test]
    fn test_oversized_overrides_are_ignored() {
        let huge = usize::MAX.to_string();
        let mut config = CacheConfig::default();
        config.apply_overrides(|key| match key {
            ENV_BLOCK_SIZE_MB | ENV_MAX_SIZE_MB => Some(huge.clone()),
            _ => None,
        });

        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.max_bytes, DEFAULT_MAX_BYTES);
    }

    #[test]
    fn test_load_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"blockSize":4096,"maxBytes":8192,"retry":{{"maxRetries":1}}}}"#).unwrap();

        let config = CacheConfig::load(file.path()).unwrap();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.max_bytes, 8192);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_delay_ms, 500);
        assert_eq!(config.stat_cache_max_entries, DEFAULT_STAT_CACHE_MAX_ENTRIES);
    }

    #[test]
    fn test_load_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(CacheConfig::load(file.path()).is_err());
    }
}
