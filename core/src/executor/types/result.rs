use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ProgressSummary;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    /// At least one task ended Failed.
    TaskFailures,
    Cancelled,
    /// The plan could not be built; no task was started.
    PlanningFailed,
}

/// Final record of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub session_id: String,

    /// True iff no task failed and the run was not cancelled.
    pub success: bool,

    pub outcome: RunOutcome,

    /// Completed task results (task_id -> result)
    pub results: HashMap<String, Value>,

    /// Failed task errors (task_id -> error)
    pub failures: BTreeMap<String, String>,

    /// Tasks skipped because a dependency did not complete
    pub skipped: Vec<String>,

    /// Execution phases (task ids per phase, in run order)
    pub phases: Vec<Vec<String>>,

    pub summary: ProgressSummary,

    pub error: Option<String>,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn is_cancelled(&self) -> bool {
        self.outcome == RunOutcome::Cancelled
    }
}
