use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

/// A re-invocable task attempt.
pub type TaskOperation<'a> =
    dyn Fn() -> BoxFuture<'a, anyhow::Result<Value>> + Send + Sync + 'a;

/// Optional collaborator that owns task-level retry.
///
/// The coordinator never retries on its own; when one of these is configured
/// each runner invocation goes through `execute_with_retry`.
#[async_trait]
pub trait Resilience: Send + Sync {
    fn name(&self) -> &str;

    async fn execute_with_retry<'a>(
        &self,
        operation: &'a TaskOperation<'a>,
        operation_id: &str,
        max_retries: u32,
    ) -> anyhow::Result<Value>;
}
