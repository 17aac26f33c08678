use std::sync::Arc;

use anyhow::Result;
use taskweave_core::config::{open_store, EngineConfig};
use taskweave_core::executor::types::RetryConfig;
use taskweave_core::executor::{Coordinator, Resilience, TaskRunner};

use crate::resilience::{ExponentialBackoff, LinearRetry, RetryExecutor, RetryStrategy};

pub fn build_retry_strategy(cfg: &RetryConfig) -> Result<Box<dyn RetryStrategy>> {
    match cfg.strategy.as_str() {
        "exponential-backoff" | "exponential" => {
            Ok(Box::new(ExponentialBackoff::new(cfg.clone())))
        }
        "linear" => Ok(Box::new(LinearRetry::new(cfg.clone()))),
        other => anyhow::bail!("unknown retry strategy: {other}"),
    }
}

pub fn build_resilience(cfg: &RetryConfig) -> Result<Arc<dyn Resilience>> {
    Ok(Arc::new(RetryExecutor::from_boxed(build_retry_strategy(cfg)?)))
}

/// Coordinator wired from `cfg`: coordinator policy, retry resilience and,
/// when enabled, the file progress store.
pub async fn build_coordinator(
    cfg: &EngineConfig,
    runner: Arc<dyn TaskRunner>,
) -> Result<Coordinator> {
    let mut builder = Coordinator::builder(runner)
        .config(cfg.coordinator.clone())
        .resilience(build_resilience(&cfg.retry)?);

    if let Some(store) = open_store(&cfg.store).await? {
        builder = builder.store(store);
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskweave_core::config::StoreConfig;
    use taskweave_core::model::{TaskSpec, TaskTreeBuilder};
    use tempfile::TempDir;

    use crate::runner::CommandRunner;

    #[test]
    fn test_build_retry_strategy() {
        let mut cfg = RetryConfig::default();
        assert_eq!(
            build_retry_strategy(&cfg).unwrap().name(),
            "exponential-backoff"
        );

        cfg.strategy = "linear".into();
        assert_eq!(build_retry_strategy(&cfg).unwrap().name(), "linear");

        cfg.strategy = "random".into();
        assert!(build_retry_strategy(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_build_coordinator_persists_and_resumes() {
        let dir = TempDir::new().unwrap();
        let cfg = EngineConfig {
            store: StoreConfig {
                directory: Some(dir.path().to_string_lossy().to_string()),
                ..StoreConfig::default()
            },
            ..EngineConfig::default()
        };

        let coordinator = build_coordinator(&cfg, Arc::new(CommandRunner::new()))
            .await
            .unwrap();

        let tree = TaskTreeBuilder::new("factory-1", "echo")
            .task(TaskSpec::new("1", "say hi").meta("command", "echo hi"))
            .build()
            .unwrap();
        let result = coordinator.execute(tree).await;
        assert!(result.success);
        assert!(dir.path().join("factory-1").join("session.json").exists());

        let resumed = coordinator.resume("factory-1").await.unwrap();
        assert!(resumed.success);
        assert_eq!(resumed.results["1"]["stdout"], "hi");
    }
}
