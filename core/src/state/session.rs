//! Persisted session records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::TaskTree;

/// Lifecycle of a persisted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Session metadata as stored, including the initial task tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_request: String,
    /// Tree as it was handed over when the session was created.
    pub task_tree: TaskTree,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SessionRecord {
    pub fn new(tree: &TaskTree) -> Self {
        let now = Utc::now();
        Self {
            session_id: tree.session_id.clone(),
            user_request: tree.user_request.clone(),
            task_tree: tree.clone(),
            status: SessionStatus::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            metadata: HashMap::new(),
        }
    }

    /// Move to `status`, stamping start and completion times once.
    pub fn transition_to(&mut self, status: SessionStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;

        match status {
            SessionStatus::Running => {
                self.started_at.get_or_insert(now);
                // a resumed session is running again
                self.completed_at = None;
            }
            SessionStatus::Completed | SessionStatus::Failed => {
                self.completed_at = Some(now);
            }
            SessionStatus::Pending => {}
        }
    }
}
