use std::time::Duration;

/// Delay policy between attempts of one operation.
///
/// `attempt` counts the attempts already made, so the first retry is asked
/// for with `attempt == 1`.
pub trait RetryStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Pause before the next attempt, or `None` once attempts are exhausted.
    fn next_delay(&self, attempt: u32, error: &str) -> Option<Duration>;

    /// Total attempts including the first one.
    fn max_attempts(&self) -> u32;

    fn should_retry(&self, attempt: u32, error: &str) -> bool {
        attempt < self.max_attempts() && !self.is_fatal_error(error)
    }

    fn is_fatal_error(&self, _error: &str) -> bool {
        false
    }
}
