//! Retry with exponential backoff for remote store calls

use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use super::errors::FetchError;
use crate::config::RetryConfig;

/// Run `f` until it succeeds, fails with a non-retryable error, runs out of
/// retries, or the next delay would overrun the deadline.
///
/// # Arguments
/// * `config` - Retry policy
/// * `operation` - Operation name for logging
/// * `name` - Object name for logging
/// * `f` - The remote call
pub fn with_retry<T, F>(config: &RetryConfig, operation: &str, name: &str, mut f: F) -> Result<T, FetchError>
where
    F: FnMut() -> Result<T, FetchError>,
{
    let started = Instant::now();
    let mut delay = config.initial_delay();

    for attempt in 0..=config.max_retries {
        match f() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() || attempt == config.max_retries {
                    return Err(e);
                }
                if started.elapsed() + delay > config.deadline() {
                    warn!(
                        operation = operation,
                        name = name,
                        error = %e,
                        "Retry deadline exceeded"
                    );
                    return Err(e);
                }

                warn!(
                    operation = operation,
                    name = name,
                    attempt = attempt + 1,
                    max = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying remote operation"
                );
                thread::sleep(delay);
                delay = next_delay(delay, config.max_delay());
            }
        }
    }

    unreachable!()
}

fn next_delay(delay: Duration, max: Duration) -> Duration {
    delay.saturating_mul(2).min(max)
}
