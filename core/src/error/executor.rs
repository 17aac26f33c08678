use thiserror::Error;

use super::store::StoreError;

/// Executor-specific errors for task graph planning and coordination.
///
/// Planning variants abort a run before any task is started. Task failures are
/// never represented here; they stay on the node that failed.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Duplicate task ID: {0}")]
    DuplicateTaskId(String),

    #[error("Dependency not found: task '{task_id}' depends on '{missing_dep}'")]
    DependencyNotFound {
        task_id: String,
        missing_dep: String,
    },

    #[error("Parent not found: task '{task_id}' has parent '{parent_id}'")]
    ParentNotFound { task_id: String, parent_id: String },

    #[error("Task '{0}' depends on itself")]
    SelfDependency(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Unable to schedule remaining tasks: {}", .0.join(", "))]
    Unschedulable(Vec<String>),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("No progress store configured")]
    StoreNotConfigured,

    #[error("Progress store error: {0}")]
    Store(#[from] StoreError),
}

impl ExecutorError {
    /// True for the variants raised while building the execution plan.
    pub fn is_planning_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTaskId(_)
                | Self::DependencyNotFound { .. }
                | Self::ParentNotFound { .. }
                | Self::SelfDependency(_)
                | Self::CircularDependency(_)
                | Self::Unschedulable(_)
        )
    }
}
