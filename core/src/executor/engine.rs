use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ExecutorError;
use crate::model::{TaskNode, TaskStatus, TaskTree};
use crate::state::ProgressStore;
use crate::tracker::ProgressTracker;

use super::cancel::CancellationFlag;
use super::plan::{build_plan, ExecutionPhase, PhaseStrategy};
use super::scheduler::{execute_phase_parallel, execute_phase_sequential};
use super::traits::{GraphProducer, Resilience, TaskRunner};
use super::types::{CoordinatorConfig, ExecutionResult, ParentContext, RunOutcome, TaskContext};

pub const CANCELLED_MESSAGE: &str = "execution cancelled";

/// What happened to one task inside a phase.
enum TaskOutcome {
    Completed(Value),
    Failed,
    Skipped,
    /// Unknown id, or already completed by an earlier attempt.
    NotRun,
}

/// Runs task trees phase by phase.
///
/// The coordinator plans, invokes the runner and collects results. All
/// node state changes go through a [`ProgressTracker`].
pub struct Coordinator {
    runner: Arc<dyn TaskRunner>,
    resilience: Option<Arc<dyn Resilience>>,
    store: Option<Arc<dyn ProgressStore>>,
    config: CoordinatorConfig,
    cancel: CancellationFlag,
}

pub struct CoordinatorBuilder {
    runner: Arc<dyn TaskRunner>,
    resilience: Option<Arc<dyn Resilience>>,
    store: Option<Arc<dyn ProgressStore>>,
    config: CoordinatorConfig,
    cancel: CancellationFlag,
}

impl CoordinatorBuilder {
    pub fn new(runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            runner,
            resilience: None,
            store: None,
            config: CoordinatorConfig::default(),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn resilience(mut self, resilience: Arc<dyn Resilience>) -> Self {
        self.resilience = Some(resilience);
        self
    }

    pub fn store(mut self, store: Arc<dyn ProgressStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an externally owned cancellation flag.
    pub fn cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = flag;
        self
    }

    pub fn build(self) -> Coordinator {
        Coordinator {
            runner: self.runner,
            resilience: self.resilience,
            store: self.store,
            config: self.config,
            cancel: self.cancel,
        }
    }
}

impl Coordinator {
    pub fn builder(runner: Arc<dyn TaskRunner>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(runner)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Handle that can cancel runs of this coordinator from elsewhere.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Tracker for `tree`, wired to this coordinator's store.
    pub fn tracker_for(&self, tree: TaskTree) -> ProgressTracker {
        let tracker = ProgressTracker::new(tree);
        match &self.store {
            Some(store) => tracker.with_store(store.clone()),
            None => tracker,
        }
    }

    /// Execute a freshly produced tree.
    #[tracing::instrument(skip_all, fields(session_id = %tree.session_id))]
    pub async fn execute(&self, tree: TaskTree) -> ExecutionResult {
        let tracker = self.tracker_for(tree);
        self.execute_tracked(&tracker).await
    }

    /// Ask `producer` for a tree and execute it under a new session id.
    pub async fn execute_request(
        &self,
        producer: &dyn GraphProducer,
        request: &str,
    ) -> anyhow::Result<ExecutionResult> {
        let session_id = Uuid::new_v4().to_string();
        let tree = producer
            .produce(&session_id, request)
            .await
            .with_context(|| format!("graph producer '{}' failed", producer.name()))?;
        Ok(self.execute(tree).await)
    }

    /// Continue a persisted session from its latest snapshot.
    ///
    /// Completed tasks are kept and feed their results forward; everything
    /// else is attempted again.
    #[tracing::instrument(skip(self))]
    pub async fn resume(&self, session_id: &str) -> Result<ExecutionResult, ExecutorError> {
        let store = self
            .store
            .as_ref()
            .ok_or(ExecutorError::StoreNotConfigured)?;
        let loaded = store
            .load_session(session_id)
            .await?
            .ok_or_else(|| ExecutorError::SessionNotFound(session_id.to_string()))?;

        let tracker =
            ProgressTracker::recover(loaded.recovery_tree().clone()).with_store(store.clone());
        Ok(self.execute_tracked(&tracker).await)
    }

    /// Execute the tree owned by `tracker`, which callers may poll meanwhile.
    pub async fn execute_tracked(&self, tracker: &ProgressTracker) -> ExecutionResult {
        let start = Instant::now();
        let session_id = tracker.session_id();
        tracker.start_tracking().await;

        let tree = tracker.snapshot();
        let phases = match build_plan(&tree, self.config.hybrid_parallel_threshold) {
            Ok(phases) => phases,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "execution plan rejected");
                let message = e.to_string();
                let summary = tracker.complete_tracking(false, Some(message.clone())).await;
                return ExecutionResult {
                    session_id,
                    success: false,
                    outcome: RunOutcome::PlanningFailed,
                    results: HashMap::new(),
                    failures: BTreeMap::new(),
                    skipped: Vec::new(),
                    phases: Vec::new(),
                    summary,
                    error: Some(message),
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
        };

        tracing::info!(
            session_id = %session_id,
            tasks = tree.task_count(),
            phases = phases.len(),
            strategy = ?tree.strategy,
            "execution plan built"
        );

        let root_id = tree.root_id().to_string();

        // Results of tasks completed by an earlier attempt
        let mut results: HashMap<String, Value> = tree
            .tasks()
            .into_iter()
            .filter(|node| node.status == TaskStatus::Completed)
            .filter_map(|node| node.result.clone().map(|r| (node.id.clone(), r)))
            .collect();

        let mut cancelled = false;
        for phase in &phases {
            if self.cancel.is_cancelled() {
                tracing::info!(session_id = %session_id, phase = phase.id, "cancellation observed");
                cancelled = true;
                break;
            }

            let outcomes = self
                .execute_phase(tracker, &root_id, phase, &results, &mut cancelled)
                .await;

            for (id, outcome) in outcomes {
                if let TaskOutcome::Completed(value) = outcome {
                    results.insert(id, value);
                }
            }

            if cancelled {
                tracing::info!(
                    session_id = %session_id,
                    phase = phase.id,
                    "cancellation observed mid-phase"
                );
                break;
            }
        }

        let final_tree = tracker.snapshot();
        let mut failures = BTreeMap::new();
        let mut skipped = Vec::new();
        for node in final_tree.tasks() {
            match node.status {
                TaskStatus::Failed => {
                    let error = node.error.clone().unwrap_or_else(|| "task failed".to_string());
                    failures.insert(node.id.clone(), error);
                }
                TaskStatus::Skipped => skipped.push(node.id.clone()),
                _ => {}
            }
        }

        let (outcome, error) = if cancelled {
            (RunOutcome::Cancelled, Some(CANCELLED_MESSAGE.to_string()))
        } else if !failures.is_empty() {
            let ids: Vec<&str> = failures.keys().map(String::as_str).collect();
            (
                RunOutcome::TaskFailures,
                Some(format!("{} task(s) failed: {}", failures.len(), ids.join(", "))),
            )
        } else {
            (RunOutcome::Succeeded, None)
        };
        let success = outcome == RunOutcome::Succeeded;

        let summary = tracker.complete_tracking(success, error.clone()).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            session_id = %session_id,
            success,
            outcome = ?outcome,
            failed = failures.len(),
            skipped = skipped.len(),
            duration_ms,
            "execution finished"
        );

        ExecutionResult {
            session_id,
            success,
            outcome,
            results,
            failures,
            skipped,
            phases: phases.into_iter().map(|p| p.task_ids).collect(),
            summary,
            error,
            duration_ms,
        }
    }

    async fn execute_phase(
        &self,
        tracker: &ProgressTracker,
        root_id: &str,
        phase: &ExecutionPhase,
        results: &HashMap<String, Value>,
        cancelled: &mut bool,
    ) -> Vec<(String, TaskOutcome)> {
        tracing::debug!(
            phase = phase.id,
            strategy = ?phase.strategy,
            tasks = phase.task_ids.len(),
            "phase starting"
        );

        let run = |id| self.run_task(tracker, root_id, phase.id, id, results);

        let outcomes = match phase.strategy {
            PhaseStrategy::Parallel => {
                execute_phase_parallel(&phase.task_ids, self.config.max_parallel, run).await
            }
            PhaseStrategy::Sequential => {
                let (outcomes, stopped) =
                    execute_phase_sequential(&phase.task_ids, || self.cancel.is_cancelled(), run)
                        .await;
                *cancelled = stopped;
                outcomes
            }
        };

        tracing::debug!(phase = phase.id, finished = outcomes.len(), "phase finished");
        outcomes
    }

    async fn run_task(
        &self,
        tracker: &ProgressTracker,
        root_id: &str,
        phase_id: usize,
        id: &str,
        results: &HashMap<String, Value>,
    ) -> TaskOutcome {
        let Some(node) = tracker.node(id) else {
            tracing::warn!(task_id = id, "planned task missing from tree");
            return TaskOutcome::NotRun;
        };

        if node.status == TaskStatus::Completed {
            tracing::debug!(task_id = id, "already completed, reusing result");
            return TaskOutcome::NotRun;
        }

        let blocked: Vec<&str> = node
            .dependencies
            .iter()
            .map(String::as_str)
            .filter(|dep| {
                *dep != root_id && tracker.status_of(dep) != Some(TaskStatus::Completed)
            })
            .collect();
        if !blocked.is_empty() {
            tracing::info!(
                task_id = id,
                blocked_by = ?blocked,
                "skipping task, dependencies did not complete"
            );
            tracker
                .update_status(id, TaskStatus::Skipped, None, None)
                .await;
            return TaskOutcome::Skipped;
        }

        tracker
            .update_status(id, TaskStatus::InProgress, None, None)
            .await;
        let context = build_task_context(tracker, &node, phase_id, results);

        let attempt = match &self.resilience {
            Some(resilience) => {
                let runner = &self.runner;
                let node = &node;
                let context = &context;
                let operation = move || runner.run(node, context);
                resilience
                    .execute_with_retry(&operation, id, self.config.max_retries)
                    .await
            }
            None => self.runner.run(&node, &context).await,
        };

        match attempt {
            Ok(value) => {
                tracker
                    .update_status(id, TaskStatus::Completed, Some(value.clone()), None)
                    .await;
                TaskOutcome::Completed(value)
            }
            Err(e) => {
                let message = format!("{e:#}");
                tracing::warn!(task_id = id, phase = phase_id, error = %message, "task failed");
                tracker
                    .update_status(id, TaskStatus::Failed, None, Some(message))
                    .await;
                TaskOutcome::Failed
            }
        }
    }
}

/// Context handed to the runner: own metadata, dependency results and the
/// parent's id, description and result.
fn build_task_context(
    tracker: &ProgressTracker,
    node: &TaskNode,
    phase_id: usize,
    results: &HashMap<String, Value>,
) -> TaskContext {
    let dependency_results = node
        .dependencies
        .iter()
        .filter_map(|dep| results.get(dep).map(|value| (dep.clone(), value.clone())))
        .collect();

    let parent = node
        .parent_id
        .as_deref()
        .and_then(|parent_id| tracker.node(parent_id))
        .map(|parent| ParentContext {
            id: parent.id,
            description: parent.description,
            result: parent.result,
        });

    TaskContext {
        session_id: tracker.session_id(),
        phase_id,
        metadata: node.metadata.clone(),
        dependency_results,
        parent,
    }
}
