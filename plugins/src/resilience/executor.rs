use async_trait::async_trait;
use serde_json::Value;
use taskweave_core::executor::{Resilience, TaskOperation};

use super::strategy::RetryStrategy;

/// [`Resilience`] implementation that re-invokes a failed operation after the
/// delay chosen by a [`RetryStrategy`].
///
/// The attempt budget is the smaller of `max_retries + 1` and the strategy's
/// own `max_attempts`. The last error is returned unchanged.
pub struct RetryExecutor {
    strategy: Box<dyn RetryStrategy>,
}

impl RetryExecutor {
    pub fn new(strategy: impl RetryStrategy + 'static) -> Self {
        Self::from_boxed(Box::new(strategy))
    }

    pub fn from_boxed(strategy: Box<dyn RetryStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }
}

#[async_trait]
impl Resilience for RetryExecutor {
    fn name(&self) -> &str {
        "retry"
    }

    async fn execute_with_retry<'a>(
        &self,
        operation: &'a TaskOperation<'a>,
        operation_id: &str,
        max_retries: u32,
    ) -> anyhow::Result<Value> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation_id, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let message = format!("{err:#}");
            let retries_used = attempt - 1;
            if retries_used >= max_retries || !self.strategy.should_retry(attempt, &message) {
                tracing::warn!(operation_id, attempt, error = %message, "giving up");
                return Err(err);
            }
            let Some(delay) = self.strategy.next_delay(attempt, &message) else {
                tracing::warn!(operation_id, attempt, error = %message, "giving up");
                return Err(err);
            };

            tracing::warn!(
                operation_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                strategy = self.strategy.name(),
                error = %message,
                "attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::future::BoxFuture;
    use futures::FutureExt;
    use taskweave_core::executor::types::RetryConfig;

    use crate::resilience::{ExponentialBackoff, LinearRetry};

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            strategy: "linear".to_string(),
            base_delay_ms: 1,
            max_delay_ms: 5,
            max_attempts,
        }
    }

    /// Fails `failures` times, then returns the attempt number.
    macro_rules! flaky {
        ($calls:expr, $failures:expr) => {{
            let calls: &AtomicU32 = $calls;
            let failures: u32 = $failures;
            move || -> BoxFuture<'_, anyhow::Result<Value>> {
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n <= failures {
                        anyhow::bail!("attempt {n} failed");
                    }
                    Ok(Value::from(n))
                }
                .boxed()
            }
        }};
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let op = flaky!(&calls, 2);
        let executor = RetryExecutor::new(LinearRetry::new(fast(5)));

        let value = executor.execute_with_retry(&op, "t1", 3).await.unwrap();
        assert_eq!(value, Value::from(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_max_retries_bounds_attempts() {
        let calls = AtomicU32::new(0);
        let op = flaky!(&calls, 10);
        let executor = RetryExecutor::new(LinearRetry::new(fast(10)));

        let err = executor.execute_with_retry(&op, "t1", 2).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.to_string(), "attempt 3 failed");
    }

    #[tokio::test]
    async fn test_strategy_attempts_bound_attempts() {
        let calls = AtomicU32::new(0);
        let op = flaky!(&calls, 10);
        let executor = RetryExecutor::new(ExponentialBackoff::new(fast(2)));

        assert!(executor.execute_with_retry(&op, "t1", 5).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let calls = AtomicU32::new(0);
        let op = flaky!(&calls, 1);
        let executor = RetryExecutor::new(LinearRetry::new(fast(4)));

        assert!(executor.execute_with_retry(&op, "t1", 0).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct NeverRetryOnAuth;

    impl RetryStrategy for NeverRetryOnAuth {
        fn name(&self) -> &str {
            "never-on-auth"
        }

        fn next_delay(&self, _attempt: u32, _error: &str) -> Option<std::time::Duration> {
            Some(std::time::Duration::from_millis(1))
        }

        fn max_attempts(&self) -> u32 {
            5
        }

        fn is_fatal_error(&self, error: &str) -> bool {
            error.contains("unauthorized")
        }
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let op = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<Value, _>(anyhow::anyhow!("unauthorized")) }.boxed()
        };
        let executor = RetryExecutor::new(NeverRetryOnAuth);

        assert!(executor.execute_with_retry(&op, "t1", 5).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.strategy_name(), "never-on-auth");
    }
}
