//! Immutable progress snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ProgressSummary, TaskTree};

/// Point-in-time copy of a tree and its summary. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub snapshot_id: String,
    pub session_id: String,
    /// Insertion order within the session, starting at 1.
    pub sequence: u64,
    pub task_tree: TaskTree,
    pub progress_summary: ProgressSummary,
    pub created_at: DateTime<Utc>,
}

impl SnapshotRecord {
    pub fn new(
        session_id: &str,
        sequence: u64,
        tree: &TaskTree,
        summary: &ProgressSummary,
    ) -> Self {
        Self {
            snapshot_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            sequence,
            task_tree: tree.clone(),
            progress_summary: summary.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
