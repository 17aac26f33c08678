use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::top_level_prefix;
use super::node::{TaskNode, TaskStatus};
use super::tree::TaskTree;

/// Node counts per status over the whole tree, root included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    fn record(&mut self, status: TaskStatus) {
        self.total += 1;
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Skipped => self.skipped += 1,
        }
    }
}

/// Derived progress view. Everything here can be recomputed from a tree and
/// its start/end timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    /// Fraction in `[0, 1]` of nodes that are Completed or Skipped.
    pub overall_progress: f64,
    pub counts: StatusCounts,
    pub elapsed_seconds: f64,
    pub estimated_remaining_seconds: f64,
    pub current_phase: Option<String>,
    pub current_task_id: Option<String>,
    pub current_task_description: Option<String>,
}

impl ProgressSummary {
    /// Compute the summary of `tree` as of `now`.
    ///
    /// `started_at` is the tracking start (elapsed is 0 before tracking
    /// begins) and `ended_at`, when set, freezes the elapsed clock.
    pub fn compute(
        tree: &TaskTree,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let nodes = tree.all_nodes();

        let mut counts = StatusCounts::default();
        for node in &nodes {
            counts.record(node.status);
        }

        let overall_progress = if counts.total == 0 {
            0.0
        } else {
            (counts.completed + counts.skipped) as f64 / counts.total as f64
        };

        let elapsed_seconds = started_at
            .map(|start| {
                let end = ended_at.unwrap_or(now);
                ((end - start).num_milliseconds().max(0)) as f64 / 1000.0
            })
            .unwrap_or(0.0);

        let current = nodes
            .iter()
            .find(|node| !tree.is_root(&node.id) && node.status == TaskStatus::InProgress);

        Self {
            overall_progress,
            counts,
            elapsed_seconds,
            estimated_remaining_seconds: estimate_remaining(&nodes),
            current_phase: current.map(|node| phase_label(tree, node)),
            current_task_id: current.map(|node| node.id.clone()),
            current_task_description: current.map(|node| node.description.clone()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.counts.pending == 0 && self.counts.in_progress == 0
    }
}

/// Two-tier remaining time estimate.
///
/// With at least two measured nodes the outstanding estimate is scaled by the
/// observed actual/estimated ratio, otherwise it is the raw outstanding sum.
pub fn estimate_remaining(nodes: &[&TaskNode]) -> f64 {
    let outstanding: f64 = nodes
        .iter()
        .filter(|node| matches!(node.status, TaskStatus::Pending | TaskStatus::InProgress))
        .map(|node| node.estimated_duration)
        .sum();

    let measured: Vec<(f64, f64)> = nodes
        .iter()
        .filter_map(|node| node.actual_duration.map(|actual| (node.estimated_duration, actual)))
        .collect();

    if measured.len() >= 2 {
        let estimated: f64 = measured.iter().map(|(est, _)| est).sum();
        let actual: f64 = measured.iter().map(|(_, act)| act).sum();
        if estimated > 0.0 {
            return (actual / estimated) * outstanding;
        }
    }

    outstanding
}

/// Phase label for a node: explicit `phase` metadata, then the parent's
/// description, then `Phase <prefix>`.
pub fn phase_label(tree: &TaskTree, node: &TaskNode) -> String {
    if let Some(phase) = node.metadata.get("phase").and_then(|v| v.as_str()) {
        return phase.to_string();
    }

    if let Some(parent) = node.parent_id.as_deref().and_then(|id| tree.get(id)) {
        return parent.description.clone();
    }

    format!("Phase {}", top_level_prefix(&node.id))
}
