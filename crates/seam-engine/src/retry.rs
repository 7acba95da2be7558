//! Read-retry policy.
//!
//! Read-only store calls (eligibility, balances) are retried with backoff
//! on transient network errors, up to three extra attempts. Write calls are
//! never auto-retried — a duplicate submission is worse than a surfaced
//! error, and idempotency keys make explicit re-invocation safe.

use std::future::Future;
use std::time::Duration;

use seam_core::constants::READ_RETRY_DELAYS_SECS;
use seam_core::Result;
use tracing::warn;

/// Constructible backoff schedule with injectable delays, so tests run
/// without sleeping.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: READ_RETRY_DELAYS_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    /// Same attempt count as the default schedule but without delays.
    pub fn immediate() -> Self {
        Self {
            delays: vec![Duration::ZERO; READ_RETRY_DELAYS_SECS.len()],
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Run a read-only operation, retrying on `is_retryable` errors per the
    /// schedule. Validation errors surface immediately.
    pub async fn read<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0usize;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.delays.len() => {
                    let delay = self.delays[attempt];
                    attempt += 1;
                    warn!(
                        op,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "transient store error on read; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
