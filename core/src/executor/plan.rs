use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;
use crate::model::{hierarchical_cmp, ExecutionStrategy, TaskTree};

/// How the tasks of one phase are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStrategy {
    Sequential,
    Parallel,
}

impl PhaseStrategy {
    /// Map the tree-level hint onto a phase of `size` tasks.
    pub fn for_phase(strategy: ExecutionStrategy, size: usize, hybrid_threshold: usize) -> Self {
        match strategy {
            ExecutionStrategy::Sequential => Self::Sequential,
            ExecutionStrategy::Parallel => Self::Parallel,
            ExecutionStrategy::Hybrid if size >= hybrid_threshold => Self::Parallel,
            ExecutionStrategy::Hybrid => Self::Sequential,
        }
    }
}

/// Tasks whose dependencies are all satisfied by earlier phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPhase {
    /// 1-based position in the plan.
    pub id: usize,
    /// Ids in collection order (hierarchical id order within the phase).
    pub task_ids: Vec<String>,
    pub strategy: PhaseStrategy,
}

/// Lay the non-root nodes of `tree` out in dependency order.
///
/// Each phase holds every node whose dependencies were all scheduled in
/// earlier phases; a dependency on the root counts as already satisfied.
/// Cycles and dangling references are reported as planning errors and no
/// phase is returned.
///
/// # Algorithm
///
/// Kahn's algorithm over the dependency edges, emitting each frontier as one
/// phase. O(V + E).
pub fn build_plan(
    tree: &TaskTree,
    hybrid_threshold: usize,
) -> Result<Vec<ExecutionPhase>, ExecutorError> {
    tree.validate()?;

    let root_id = tree.root_id();
    let tasks = tree.tasks();

    let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for task in &tasks {
        let deps: Vec<&str> = task
            .dependencies
            .iter()
            .map(String::as_str)
            .filter(|dep| *dep != root_id)
            .collect();
        in_degree.insert(task.id.as_str(), deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(task.id.as_str());
        }
    }

    // `tasks` is already in hierarchical order
    let mut current: Vec<&str> = tasks
        .iter()
        .map(|task| task.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut phases = Vec::new();
    let mut scheduled = 0usize;

    while !current.is_empty() {
        scheduled += current.len();

        let mut next = Vec::new();
        for id in &current {
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(*dependent);
                    }
                }
            }
        }
        next.sort_by(|a, b| hierarchical_cmp(a, b));

        phases.push(ExecutionPhase {
            id: phases.len() + 1,
            strategy: PhaseStrategy::for_phase(tree.strategy, current.len(), hybrid_threshold),
            task_ids: current.iter().map(|id| id.to_string()).collect(),
        });
        current = next;
    }

    if scheduled != tasks.len() {
        // validate() rejects cycles first; this only trips on inconsistent input
        let mut stuck: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        stuck.sort_by(|a, b| hierarchical_cmp(a, b));
        return Err(ExecutorError::Unschedulable(stuck));
    }

    Ok(phases)
}
