//! Retry-based [`Resilience`](taskweave_core::executor::Resilience) support.

pub mod executor;
pub mod retry;
pub mod strategy;

pub use executor::RetryExecutor;
pub use retry::{ExponentialBackoff, LinearRetry};
pub use strategy::RetryStrategy;
