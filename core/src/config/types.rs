use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::executor::types::{CoordinatorConfig, RetryConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Reject settings the coordinator cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.coordinator.max_parallel == 0 {
            anyhow::bail!("coordinator.max_parallel must be at least 1");
        }
        if self.coordinator.max_parallel > Semaphore::MAX_PERMITS {
            anyhow::bail!(
                "coordinator.max_parallel must be at most {}",
                Semaphore::MAX_PERMITS
            );
        }
        if self.coordinator.hybrid_parallel_threshold == 0 {
            anyhow::bail!("coordinator.hybrid_parallel_threshold must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_enabled")]
    pub enabled: bool,

    /// Session directory. If empty or unset, `<data dir>/sessions` is used.
    #[serde(default)]
    pub directory: Option<String>,

    /// Sessions older than this are pruned when the store is opened.
    /// 0 keeps everything.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_store_enabled() -> bool {
    true
}

fn default_retention_days() -> u32 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: default_store_enabled(),
            directory: None,
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "taskweave_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}
