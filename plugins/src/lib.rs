//! Collaborators for the taskweave coordinator: a shell command runner, a
//! retry-based resilience layer and a JSON plan file producer.

pub mod factory;
pub mod producer;
pub mod resilience;
pub mod runner;

pub use factory::{build_coordinator, build_resilience, build_retry_strategy};
pub use producer::FileGraphProducer;
pub use resilience::{ExponentialBackoff, LinearRetry, RetryExecutor, RetryStrategy};
pub use runner::CommandRunner;
