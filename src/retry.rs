//! Bounded retry for backing store calls.
//!
//! Only transient connectivity failures (see
//! [`TRANSIENT_ERROR_CODES`](crate::error::TRANSIENT_ERROR_CODES)) are retried;
//! everything else surfaces on the first attempt.
//!
//! # Timeouts
//!
//! With [`RetryPolicy::timeout`] set, each attempt races a timer. When the
//! timer wins the attempt's future is dropped, which cancels it at its next
//! await point and drops any connection it owned (returning it to the pool).
//! Work the driver already handed to the server is not recalled.

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Retry settings for one call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts (values below 1 are treated as 1).
    pub retries: u32,
    /// Delay before the second attempt; doubles every attempt.
    pub base_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: 3,
            base_delay: Duration::from_millis(1000),
            timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Backoff after the zero-based `attempt` failed: `base_delay * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(31)))
    }
}

/// Runs backing store operations with retry, timeout and a shutdown gate.
#[derive(Debug, Default)]
pub struct RetryExecutor {
    shutting_down: AtomicBool,
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent call with [`Error::ShuttingDown`].
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Fail fast once shutdown started.
    pub fn ensure_running(&self) -> Result<()> {
        if self.is_shutting_down() {
            Err(Error::ShuttingDown)
        } else {
            Ok(())
        }
    }

    /// Run `op` until it succeeds, fails with a non-transient error or the
    /// attempts run out.
    ///
    /// # Errors
    /// - `Error::ShuttingDown` after [`shutdown`](Self::shutdown)
    /// - `Error::Timeout` when an attempt exceeds `policy.timeout`
    /// - the last error returned by `op` otherwise
    pub async fn run<T, F, Fut>(&self, policy: &RetryPolicy, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = policy.retries.max(1);
        let mut attempt = 0;

        loop {
            self.ensure_running()?;

            let result = match policy.timeout {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(result) => result,
                    Err(_) => {
                        return Err(Error::Timeout(format!(
                            "query exceeded {}ms",
                            limit.as_millis()
                        )))
                    }
                },
                None => op().await,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        "Transient backing store error (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        error!("Backing store still unavailable after {} attempts: {}", attempts, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::default().with_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let executor = RetryExecutor::new();
        let value = executor
            .run(&fast_policy(), || async { Ok::<_, Error>(7) })
            .await
            .expect("run");
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let executor = RetryExecutor::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let value = executor
            .run(&fast_policy(), move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::query("ECONNREFUSED", "refused"))
                    } else {
                        Ok("rows")
                    }
                }
            })
            .await
            .expect("run");

        assert_eq!(value, "rows");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let executor = RetryExecutor::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let err = executor
            .run(&fast_policy(), move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(Error::query("ETIMEDOUT", format!("attempt {}", n))) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.code(), Some("ETIMEDOUT"));
        assert!(err.to_string().contains("attempt 2"));
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let executor = RetryExecutor::new();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let err = executor
            .run(&fast_policy(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Error::query("ER_PARSE_ERROR", "syntax")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.code(), Some("ER_PARSE_ERROR"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));

        let executor = RetryExecutor::new();
        let started = tokio::time::Instant::now();
        let _ = executor
            .run(&policy, || async {
                Err::<(), _>(Error::query("ENOTFOUND", "dns"))
            })
            .await;
        // 1s + 2s between three attempts
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_abandons_slow_attempt() {
        let executor = RetryExecutor::new();
        let policy = fast_policy().with_timeout(Duration::from_millis(50));

        let err = executor
            .run(&policy, || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, Error>(())
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_shutdown_fails_fast() {
        let executor = RetryExecutor::new();
        executor.shutdown();

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let err = executor
            .run(&fast_policy(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, Error>(()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ShuttingDown));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
