use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskweave_core::executor::GraphProducer;
use taskweave_core::model::{ExecutionStrategy, TaskSpec, TaskTree, TaskTreeBuilder};

/// On-disk plan document.
///
/// ```json
/// {
///   "strategy": "hybrid",
///   "tasks": [
///     {"id": "1", "description": "fetch", "metadata": {"command": "make fetch"}},
///     {"id": "2", "description": "build", "dependencies": ["1"]}
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub strategy: ExecutionStrategy,

    /// Root node description. Defaults to the request text.
    #[serde(default)]
    pub root_description: Option<String>,

    pub tasks: Vec<TaskSpec>,
}

/// Produces task trees from a JSON plan file, re-read on every request.
pub struct FileGraphProducer {
    path: PathBuf,
}

impl FileGraphProducer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_plan(&self) -> Result<PlanFile> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read plan {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse plan {}", self.path.display()))
    }
}

#[async_trait]
impl GraphProducer for FileGraphProducer {
    fn name(&self) -> &str {
        "file"
    }

    async fn produce(&self, session_id: &str, request: &str) -> Result<TaskTree> {
        let plan = self.read_plan().await?;
        let task_count = plan.tasks.len();

        let mut builder = TaskTreeBuilder::new(session_id, request).strategy(plan.strategy);
        if let Some(description) = plan.root_description {
            builder = builder.root("0", description);
        }
        let tree = builder
            .tasks(plan.tasks)
            .build()
            .with_context(|| format!("invalid plan {}", self.path.display()))?;

        tracing::info!(
            session_id,
            tasks = task_count,
            plan = %self.path.display(),
            "loaded plan"
        );
        Ok(tree)
    }
}
