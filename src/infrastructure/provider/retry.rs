//! Retry policy with exponential backoff, applied by the caller around a
//! single provider attempt (SPEC_FULL.md §4.1).
//!
//! - `timeout` / network / 5xx: sleep `backoffBase * 2^attempt`, retry up
//!   to `maxRetries`.
//! - HTTP 429: honor `Retry-After` (seconds, default 60), counting against
//!   the same `maxRetries` budget.
//! - Any other 4xx: never retried.
//!
//! A single logical call never issues more than `maxRetries + 1` attempts
//! total (Testable property #7).

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::errors::ProviderError;

/// Retry policy with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base backoff for network/timeout/5xx failures.
    pub backoff_base: Duration,
    /// Ceiling on any single backoff sleep.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Construct a retry policy with explicit bounds.
    #[must_use]
    pub const fn new(max_retries: u32, backoff_base: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
            max_backoff,
        }
    }

    /// Execute `operation` under this retry policy, aborting immediately if
    /// `cancel` fires. Returns `ProviderError::Cancelled` when cancellation
    /// wins the race, regardless of the operation's own state.
    pub async fn execute<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                r = operation() => r,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_retries || !err.is_transient() {
                        return Err(err);
                    }

                    let backoff = self.backoff_for(attempt, &err);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        ?backoff,
                        %err,
                        "retrying provider call"
                    );

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                        () = sleep(backoff) => {}
                    }

                    attempt += 1;
                }
            }
        }
    }

    /// Backoff duration for a given (0-indexed) attempt and the error that
    /// triggered the retry. 429s honor `Retry-After`; everything else uses
    /// the exponential schedule.
    fn backoff_for(&self, attempt: u32, err: &ProviderError) -> Duration {
        if let Some(retry_after_secs) = err.retry_after_secs() {
            return Duration::from_secs(retry_after_secs).min(self.max_backoff);
        }

        let exp = 2u32.saturating_pow(attempt);
        (self.backoff_base.saturating_mul(exp)).min(self.max_backoff)
    }
}

/// Number of attempts actually issued, for logging/metrics callers that
/// want to assert Testable Property #7 without re-deriving it.
#[must_use]
pub const fn max_attempts(policy: &RetryPolicy) -> u32 {
    policy.max_retries + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn policy_fast() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(200))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(500));
        let err = ProviderError::Timeout;
        assert_eq!(policy.backoff_for(0, &err), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1, &err), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(2, &err), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(3, &err), Duration::from_millis(500)); // capped
    }

    #[test]
    fn test_rate_limit_honors_retry_after_over_exponential() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_secs(300));
        let err = ProviderError::RateLimitExceeded { retry_after_secs: 1 };
        assert_eq!(policy.backoff_for(5, &err), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let policy = policy_fast();
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .execute(&cancel, || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ProviderError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let policy = policy_fast();
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .execute(&cancel, || {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(ProviderError::ServerError(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "down".to_string(),
                        ))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_never_retries_permanent_error() {
        let policy = policy_fast();
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute(&cancel, || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::InvalidApiKey)
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_never_exceeds_max_retries_plus_one_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5));
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute(&cancel, || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Timeout)
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), max_attempts(&policy));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_immediately() {
        let policy = RetryPolicy::new(5, Duration::from_secs(30), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let start = Instant::now();
        let result: Result<(), _> = policy
            .execute(&cancel, || async { Err(ProviderError::Timeout) })
            .await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
