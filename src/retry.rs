//! Retry with exponential backoff for transport submissions.
//!
//! `retries` counts additional attempts after the first, so an operation
//! runs at most `retries + 1` times. Errors that are not retryable are
//! returned immediately without consuming the retry budget.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::Config;
use crate::transport::TransportError;

/// Retry limits and backoff shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure
    pub retries: u32,

    /// Delay before the first retry, doubled for each one after
    pub base_delay: Duration,

    /// Upper bound on a single delay, jitter included
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retries: config.retries,
            base_delay: config.backoff_base,
            max_delay: config.backoff_max,
        }
    }

    /// Delay before retry number `retry` (1-based).
    ///
    /// delay = min(base * 2^(retry - 1) + jitter, max), jitter up to 25%.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let exponent = retry.saturating_sub(1).min(16);
        let exponential = base_ms.saturating_mul(1 << exponent);

        let jitter = rand::thread_rng().gen_range(0..=exponential / 4);

        Duration::from_millis(exponential.saturating_add(jitter).min(max_ms))
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent. The last error is returned on failure.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut retry = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if retry > 0 {
                    debug!(retries = retry, "Request succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                warn!(error = %e, status = ?e.status_code(), "Request failed with non-retryable error");
                return Err(e);
            }
            Err(e) if retry >= policy.retries => {
                warn!(error = %e, attempts = retry + 1, "Request failed, retries exhausted");
                return Err(e);
            }
            Err(e) => {
                retry += 1;
                let delay = policy.backoff_delay(retry);
                warn!(
                    error = %e,
                    retry = retry,
                    max_retries = policy.retries,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, will retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    /// Fails `failures` times with `error`, then succeeds.
    async fn run_flaky(
        policy: &RetryPolicy,
        error: TransportError,
        failures: u32,
    ) -> (Result<(), TransportError>, u32) {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(policy, || {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let error = error.clone();
            async move {
                if call <= failures {
                    Err(error)
                } else {
                    Ok(())
                }
            }
        })
        .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[test]
    fn test_backoff_delay_increases() {
        let policy = RetryPolicy::default();

        let delay1 = policy.backoff_delay(1);
        let delay2 = policy.backoff_delay(2);
        let delay3 = policy.backoff_delay(3);

        // Base delay is 500ms plus up to 25% jitter
        assert!(delay1.as_millis() >= 500);
        assert!(delay1.as_millis() <= 625);

        assert!(delay2.as_millis() >= 1000);
        assert!(delay2.as_millis() <= 1250);

        assert!(delay3.as_millis() >= 2000);
        assert!(delay3.as_millis() <= 2500);
    }

    #[test]
    fn test_backoff_delay_caps_at_max() {
        let policy = RetryPolicy::default();
        let delay = policy.backoff_delay(40);
        assert_eq!(delay, Duration::from_secs(30));
    }

    #[test]
    fn test_policy_from_config() {
        let config = Config {
            retries: 7,
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(100),
            ..Config::new("src", "dst")
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.retries, 7);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_succeeds_when_failures_within_budget() {
        let errors = [
            TransportError::transient("generic exception"),
            TransportError::status(500, "Internal Server Error"),
            TransportError::status(429, "Too Many Requests"),
            TransportError::Timeout,
        ];

        for error in errors {
            for retries in 0..4 {
                for failures in 0..=retries {
                    let (result, calls) = run_flaky(&fast_policy(retries), error.clone(), failures).await;
                    assert!(result.is_ok(), "{failures} failures with {retries} retries should succeed");
                    assert_eq!(calls, failures + 1);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_fails_when_failures_exceed_budget() {
        for retries in 0..4 {
            let error = TransportError::status(500, "Internal Server Error");
            let (result, calls) = run_flaky(&fast_policy(retries), error.clone(), retries + 1).await;
            assert_eq!(result.unwrap_err(), error);
            assert_eq!(calls, retries + 1);
        }
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let error = TransportError::status(400, "Client Errors");
        let (result, calls) = run_flaky(&fast_policy(5), error.clone(), 1).await;

        assert_eq!(result.unwrap_err(), error);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_non_retryable_after_retryable_stops() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&fast_policy(5), || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Err(TransportError::status(503, "Unavailable"))
                } else {
                    Err(TransportError::status(403, "Forbidden"))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap_err().status_code(), Some(403));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
