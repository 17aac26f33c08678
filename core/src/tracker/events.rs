use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::TaskStatus;

/// Notifications published by the progress tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    TrackingStarted {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        session_id: String,
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
        overall_progress: f64,
        timestamp: DateTime<Utc>,
    },
    TrackingCompleted {
        session_id: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::TrackingStarted { session_id, .. }
            | Self::StatusChanged { session_id, .. }
            | Self::TrackingCompleted { session_id, .. } => session_id,
        }
    }
}
