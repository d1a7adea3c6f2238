//! Bounded retry of whole transactions on storage contention.

use std::future::Future;
use std::time::Duration;

use opentelemetry::KeyValue;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// Exponential backoff: `base_delay * 2^n`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl super::Db {
    /// Run `op` until it succeeds, fails permanently, or exhausts the retry
    /// budget on transient errors (`Error::is_transient`).
    ///
    /// `op` must build and commit its own transaction on each call, so a
    /// failed attempt leaves nothing behind.
    pub async fn retrying<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = &self.retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Err(e) if e.is_transient() => {
                    metrics::storage_retries()
                        .add(1, &[KeyValue::new("operation", operation)]);
                    if attempt >= policy.max_attempts {
                        warn!(operation, attempts = attempt, error = %e, "storage contention, giving up");
                        return Err(Error::TransientStorage {
                            operation,
                            attempts: attempt,
                        });
                    }
                    let delay = policy.delay_for(attempt - 1);
                    debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient storage error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
