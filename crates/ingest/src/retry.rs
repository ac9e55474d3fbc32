//! Bounded retries with exponential backoff.
//!
//! [`RetryPolicy::execute`] wraps a single provider operation. Transient
//! errors (network, timeout, 5xx, provider rate limits — see
//! [`IngestError::is_transient`]) are retried up to the attempt budget with
//! doubling delays; permanent errors return immediately. An operation that
//! stays transient through the whole budget comes back as
//! [`IngestError::RetriesExhausted`], which the orchestrator reports as a
//! failure — distinct from an expected no-data gap.

use std::time::Duration;
use tracing::{debug, warn};

use ingest_core::{IngestError, Result};

/// Retry budget and backoff schedule for provider calls.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts with 1s, 2s, 4s between them.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with an explicit budget and base delay.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            base_delay,
        }
    }

    /// Delay before retrying after the given zero-based attempt.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op`, retrying transient failures up to the budget.
    ///
    /// # Errors
    /// Permanent errors pass through untouched on the first occurrence;
    /// a transient error that survives the budget becomes
    /// [`IngestError::RetriesExhausted`].
    pub async fn execute<T, F, Fut>(&self, provider: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        warn!(provider, attempts = attempt, error = %err, "retries exhausted");
                        return Err(IngestError::RetriesExhausted {
                            provider: provider.to_string(),
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    let delay = self.delay_for_attempt(attempt - 1);
                    debug!(provider, attempt, ?delay, error = %err, "transient error, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> IngestError {
        IngestError::Network("connection reset".into())
    }

    fn permanent() -> IngestError {
        IngestError::Http {
            provider: "fmp".into(),
            status: 404,
        }
    }

    #[test]
    fn backoff_doubles_from_the_base_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_exhaust_the_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<()> = policy
            .execute("fmp", || {
                calls.fetch_add(1, Ordering::Relaxed);
                async { Err(transient()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::Relaxed), 3);
        match result.unwrap_err() {
            IngestError::RetriesExhausted { provider, attempts, .. } => {
                assert_eq!(provider, "fmp");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_return_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<()> = policy
            .execute("fmp", || {
                calls.fetch_add(1, Ordering::Relaxed);
                async { Err(permanent()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(matches!(result.unwrap_err(), IngestError::Http { status: 404, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_when_a_retry_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result = policy
            .execute("fmp", || {
                let n = calls.fetch_add(1, Ordering::Relaxed);
                async move {
                    if n == 0 { Err(transient()) } else { Ok(n) }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
