use std::time::Duration;

use taskweave_core::executor::types::RetryConfig;

use super::strategy::RetryStrategy;

/// Doubles the delay after every failed attempt, up to `max_delay_ms`.
pub struct ExponentialBackoff {
    config: RetryConfig,
}

/// Grows the delay by `base_delay_ms` after every failed attempt.
pub struct LinearRetry {
    config: RetryConfig,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl LinearRetry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, attempt: u32, _error: &str) -> Option<Duration> {
        if attempt == 0 || attempt >= self.config.max_attempts {
            return None;
        }
        let exp = 1u64 << (attempt - 1).min(30);
        let delay = self.config.base_delay_ms.saturating_mul(exp);
        let delay = delay.min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

impl RetryStrategy for LinearRetry {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, attempt: u32, _error: &str) -> Option<Duration> {
        if attempt == 0 || attempt >= self.config.max_attempts {
            return None;
        }
        let delay = self.config.base_delay_ms.saturating_mul(u64::from(attempt));
        let delay = delay.min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: &str, base: u64, max: u64, attempts: u32) -> RetryConfig {
        RetryConfig {
            strategy: strategy.to_string(),
            base_delay_ms: base,
            max_delay_ms: max,
            max_attempts: attempts,
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let strategy = ExponentialBackoff::new(config("exponential-backoff", 100, 1000, 6));
        assert_eq!(strategy.next_delay(1, "err").unwrap().as_millis(), 100);
        assert_eq!(strategy.next_delay(2, "err").unwrap().as_millis(), 200);
        assert_eq!(strategy.next_delay(4, "err").unwrap().as_millis(), 800);
        // capped
        assert_eq!(strategy.next_delay(5, "err").unwrap().as_millis(), 1000);
        assert_eq!(strategy.next_delay(6, "err"), None);
        assert!(strategy.should_retry(5, "err"));
        assert!(!strategy.should_retry(6, "err"));
    }

    #[test]
    fn test_linear_backoff() {
        let strategy = LinearRetry::new(config("linear", 50, 120, 4));
        assert_eq!(strategy.next_delay(1, "err").unwrap().as_millis(), 50);
        assert_eq!(strategy.next_delay(2, "err").unwrap().as_millis(), 100);
        assert_eq!(strategy.next_delay(3, "err").unwrap().as_millis(), 120);
        assert_eq!(strategy.next_delay(4, "err"), None);
    }

    #[test]
    fn test_huge_attempt_counts_do_not_overflow() {
        let strategy = ExponentialBackoff::new(config(
            "exponential-backoff",
            u64::MAX / 2,
            u64::MAX,
            u32::MAX,
        ));
        assert_eq!(strategy.next_delay(40, "err"), Some(Duration::from_millis(u64::MAX)));
    }
}
