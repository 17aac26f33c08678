use async_trait::async_trait;
use serde_json::Value;

use crate::executor::types::TaskContext;
use crate::model::TaskNode;

/// Executes a single task.
///
/// Called concurrently for distinct nodes inside a parallel phase. An `Err`
/// marks the node Failed with the error's display text.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, node: &TaskNode, context: &TaskContext) -> anyhow::Result<Value>;
}
