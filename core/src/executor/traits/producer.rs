use async_trait::async_trait;

use crate::model::TaskTree;

/// Source of task graphs for a request.
///
/// The returned tree is re-validated when the plan is built, so producers
/// are not trusted to uphold the DAG invariants.
#[async_trait]
pub trait GraphProducer: Send + Sync {
    fn name(&self) -> &str;

    async fn produce(&self, session_id: &str, request: &str) -> anyhow::Result<TaskTree>;
}
