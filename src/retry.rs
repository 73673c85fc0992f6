//! Bounded-attempt, fixed-delay retry policy
//!
//! Wraps any async fallible operation. Only errors the policy classifies as
//! retryable are re-run; everything else is returned on the first failure.
//!
//! Presets:
//!     - reads():  3 attempts, no delay (monitor reads)
//!     - writes(): 3 attempts, 5 s delay (transaction submission)
//!
//! Created: 2026-02-03

use crate::error::OperatorError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default attempt budget for both reads and writes
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between write attempts
pub const WRITE_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub retry_on: fn(&OperatorError) -> bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            retry_on: OperatorError::is_transient,
        }
    }

    /// Ledger reads: 3 attempts back to back
    pub fn reads() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::ZERO)
    }

    /// Ledger writes: 3 attempts, 5 s apart
    pub fn writes() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, WRITE_RETRY_DELAY)
    }

    pub fn with_retry_on(mut self, retry_on: fn(&OperatorError) -> bool) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<F, Fut, T>(&self, label: &str, mut op: F) -> Result<T, OperatorError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OperatorError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && (self.retry_on)(&e) => {
                    warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        label, attempt, self.max_attempts, e, self.delay
                    );
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::reads()
    }
}
