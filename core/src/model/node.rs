use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a single task node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work inside a [`TaskTree`](super::TaskTree).
///
/// Nodes are created by a graph producer and afterwards only mutated by the
/// progress tracker. The mutating helpers are therefore crate-private.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Hierarchical id such as `"2.1"`.
    pub id: String,
    pub parent_id: Option<String>,
    /// Nesting depth; the root is 0.
    pub depth: u32,
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Ids this node waits on, in declaration order without duplicates.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Estimated duration in seconds.
    pub estimated_duration: f64,
    /// Measured duration in seconds, set on the terminal transition.
    #[serde(default)]
    pub actual_duration: Option<f64>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TaskNode {
    /// Estimates that are not strictly positive fall back to one second.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        estimated_duration: f64,
    ) -> Self {
        let estimated_duration = if estimated_duration.is_finite() && estimated_duration > 0.0 {
            estimated_duration
        } else {
            1.0
        };

        Self {
            id: id.into(),
            parent_id: None,
            depth: 0,
            description: description.into(),
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            estimated_duration,
            actual_duration: None,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            metadata: Map::new(),
        }
    }

    /// Attach to a parent sitting at `parent_depth`.
    pub fn with_parent(mut self, parent_id: impl Into<String>, parent_depth: u32) -> Self {
        self.parent_id = Some(parent_id.into());
        self.depth = parent_depth + 1;
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Record the start of execution. The timestamp is only set once.
    pub(crate) fn mark_started(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::InProgress;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// Move into a terminal status, stamping completion time and duration.
    ///
    /// Without a start timestamp the actual duration is left unset.
    pub(crate) fn mark_finished(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        if let (Some(start), Some(end)) = (self.started_at, self.completed_at) {
            let end = end.max(start);
            self.completed_at = Some(end);
            self.actual_duration = Some((end - start).num_milliseconds() as f64 / 1000.0);
        }
    }

    /// Forget everything a previous attempt recorded on this node.
    pub(crate) fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.actual_duration = None;
        self.started_at = None;
        self.completed_at = None;
        self.result = None;
        self.error = None;
    }
}
