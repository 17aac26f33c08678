use serde::{Deserialize, Serialize};

/// Coordinator policy knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Under the hybrid strategy, phases with at least this many tasks run in
    /// parallel and smaller ones run sequentially.
    #[serde(default = "default_hybrid_parallel_threshold")]
    pub hybrid_parallel_threshold: usize,

    /// Upper bound on concurrently running tasks inside a parallel phase.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Retry budget handed to the resilience collaborator, if one is set.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_hybrid_parallel_threshold() -> usize {
    3
}

fn default_max_parallel() -> usize {
    num_cpus::get().max(1)
}

fn default_max_retries() -> u32 {
    3
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            hybrid_parallel_threshold: default_hybrid_parallel_threshold(),
            max_parallel: default_max_parallel(),
            max_retries: default_max_retries(),
        }
    }
}

/// Retry delay policy used by resilience implementations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// `exponential-backoff` or `linear`.
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_retry_strategy() -> String {
    "exponential-backoff".to_string()
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    4
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_retry_strategy(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}
