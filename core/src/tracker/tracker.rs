use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::model::{ProgressSummary, TaskNode, TaskStatus, TaskTree};
use crate::state::{ProgressStore, SessionStatus};

use super::events::ProgressEvent;

const EVENT_CAPACITY: usize = 256;

struct TrackerState {
    tree: TaskTree,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl TrackerState {
    fn summary(&self, now: DateTime<Utc>) -> ProgressSummary {
        ProgressSummary::compute(&self.tree, self.started_at, self.ended_at, now)
    }
}

/// Owns the live task tree for one execution attempt.
///
/// Node mutation happens under a single mutex. Writes to the progress store
/// are issued after that mutex is released, one at a time, so persisted
/// snapshots appear in the same order as the transitions they capture.
/// Store failures are logged and never interrupt the run.
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
    store: Option<Arc<dyn ProgressStore>>,
    persist_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<ProgressEvent>,
}

impl ProgressTracker {
    pub fn new(tree: TaskTree) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(TrackerState {
                tree,
                started_at: None,
                ended_at: None,
            }),
            store: None,
            persist_lock: tokio::sync::Mutex::new(()),
            events,
        }
    }

    /// Tracker for a tree restored from a snapshot.
    ///
    /// Completed nodes keep their results. Every other node, root included,
    /// goes back to Pending so it can be attempted again.
    pub fn recover(mut tree: TaskTree) -> Self {
        let mut reset = 0usize;
        for node in tree.tasks_mut() {
            if node.status != TaskStatus::Completed {
                if node.status != TaskStatus::Pending {
                    reset += 1;
                }
                node.reset();
            }
        }
        tree.root_mut().reset();

        tracing::info!(session_id = %tree.session_id, reset, "recovered task tree from snapshot");
        Self::new(tree)
    }

    pub fn with_store(mut self, store: Arc<dyn ProgressStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ProgressEvent) {
        let _ = self.events.send(event);
    }

    pub fn session_id(&self) -> String {
        self.lock().tree.session_id.clone()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.lock().started_at
    }

    /// Copy of the current tree.
    pub fn snapshot(&self) -> TaskTree {
        self.lock().tree.clone()
    }

    pub fn node(&self, id: &str) -> Option<TaskNode> {
        self.lock().tree.get(id).cloned()
    }

    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.lock().tree.get(id).map(|node| node.status)
    }

    /// Start the run clock and mark the root as in progress.
    pub async fn start_tracking(&self) {
        let _persist = self.persist_guard(true).await;

        let (session_id, persisted) = {
            let mut state = self.lock();
            let now = Utc::now();
            state.started_at = Some(now);
            state.ended_at = None;
            state.tree.root_mut().mark_started(now);

            let session_id = state.tree.session_id.clone();
            let persisted = self
                .store
                .is_some()
                .then(|| (state.tree.clone(), state.summary(now)));
            (session_id, persisted)
        };

        tracing::info!(session_id = %session_id, "tracking started");
        self.emit(ProgressEvent::TrackingStarted {
            session_id: session_id.clone(),
            timestamp: Utc::now(),
        });

        if let (Some(store), Some((tree, summary))) = (&self.store, persisted) {
            let result = async {
                match store.create_session(&tree).await {
                    Ok(_) | Err(StoreError::SessionExists(_)) => {}
                    Err(e) => return Err(e),
                }
                store
                    .update_session_status(&session_id, SessionStatus::Running)
                    .await?;
                store.append_snapshot(&session_id, &tree, &summary).await?;
                Ok::<(), StoreError>(())
            }
            .await;
            log_store_failure(&session_id, "start", result);
        }
    }

    /// Apply a status transition to one node.
    ///
    /// Unknown ids and transitions out of a terminal status are refused with a
    /// warning; the return value tells whether the update was applied.
    pub async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> bool {
        let persists = matches!(status, TaskStatus::Completed | TaskStatus::Failed);
        let _persist = self.persist_guard(persists).await;

        let (session_id, from, progress, persisted) = {
            let mut state = self.lock();
            let now = Utc::now();
            let session_id = state.tree.session_id.clone();

            let Some(node) = state.tree.get_mut(id) else {
                tracing::warn!(session_id = %session_id, task_id = id, "status update for unknown task");
                return false;
            };

            let from = node.status;
            if from.is_terminal() {
                tracing::warn!(
                    session_id = %session_id,
                    task_id = id,
                    from = %from,
                    to = %status,
                    "refusing transition out of terminal status"
                );
                return false;
            }

            match status {
                TaskStatus::Pending => node.status = TaskStatus::Pending,
                TaskStatus::InProgress => node.mark_started(now),
                TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped => {
                    // results belong to Completed nodes, errors to Failed ones
                    if status == TaskStatus::Completed && result.is_some() {
                        node.result = result;
                    }
                    if status == TaskStatus::Failed && error.is_some() {
                        node.error = error;
                    }
                    node.mark_finished(status, now);
                }
            }

            let summary = state.summary(now);
            let progress = summary.overall_progress;

            // published under the lock so subscribers see transitions in order
            self.emit(ProgressEvent::StatusChanged {
                session_id: session_id.clone(),
                task_id: id.to_string(),
                from,
                to: status,
                overall_progress: progress,
                timestamp: now,
            });

            let persisted = (persists && self.store.is_some())
                .then(|| (state.tree.clone(), summary));
            (session_id, from, progress, persisted)
        };

        tracing::debug!(
            session_id = %session_id,
            task_id = id,
            from = %from,
            to = %status,
            progress,
            "task status changed"
        );
        if let (Some(store), Some((tree, summary))) = (&self.store, persisted) {
            let result = store
                .append_snapshot(&session_id, &tree, &summary)
                .await
                .map(|_| ());
            log_store_failure(&session_id, "snapshot", result);
        }

        true
    }

    /// Current progress summary.
    pub fn progress_summary(&self) -> ProgressSummary {
        self.lock().summary(Utc::now())
    }

    /// Stop the run clock and settle the root node.
    pub async fn complete_tracking(&self, success: bool, error: Option<String>) -> ProgressSummary {
        let _persist = self.persist_guard(true).await;

        let (session_id, summary, tree) = {
            let mut state = self.lock();
            let now = Utc::now();
            state.ended_at = Some(now);

            let root = state.tree.root_mut();
            if !root.status.is_terminal() {
                if !success {
                    root.error = error;
                }
                let status = if success {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                root.mark_finished(status, now);
            }

            let summary = state.summary(now);
            let tree = self.store.is_some().then(|| state.tree.clone());
            (state.tree.session_id.clone(), summary, tree)
        };

        tracing::info!(
            session_id = %session_id,
            success,
            completed = summary.counts.completed,
            failed = summary.counts.failed,
            skipped = summary.counts.skipped,
            elapsed_seconds = summary.elapsed_seconds,
            "tracking completed"
        );
        self.emit(ProgressEvent::TrackingCompleted {
            session_id: session_id.clone(),
            success,
            timestamp: Utc::now(),
        });

        if let (Some(store), Some(tree)) = (&self.store, tree) {
            let status = if success {
                SessionStatus::Completed
            } else {
                SessionStatus::Failed
            };
            let result = async {
                store.append_snapshot(&session_id, &tree, &summary).await?;
                store.update_session_status(&session_id, status).await?;
                Ok::<(), StoreError>(())
            }
            .await;
            log_store_failure(&session_id, "complete", result);
        }

        summary
    }

    async fn persist_guard(&self, needed: bool) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        if needed && self.store.is_some() {
            Some(self.persist_lock.lock().await)
        } else {
            None
        }
    }
}

fn log_store_failure(session_id: &str, stage: &str, result: Result<(), StoreError>) {
    if let Err(e) = result {
        tracing::warn!(
            session_id,
            stage,
            error = %e,
            "progress store write failed; continuing in memory"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryProgressStore;
    use async_trait::async_trait;
    use serde_json::json;

    fn tree() -> TaskTree {
        let mut tree = TaskTree::new("s-1", "req", TaskNode::new("0", "root", 1.0));
        tree.insert(TaskNode::new("1", "a", 2.0).with_parent("0", 0))
            .unwrap();
        tree.insert(TaskNode::new("2", "b", 3.0).with_dependencies(["1"]))
            .unwrap();
        tree
    }

    #[tokio::test]
    async fn test_status_lifecycle_sets_timestamps_once() {
        let tracker = ProgressTracker::new(tree());
        tracker.start_tracking().await;
        assert_eq!(tracker.status_of("0"), Some(TaskStatus::InProgress));

        assert!(tracker.update_status("1", TaskStatus::InProgress, None, None).await);
        let started = tracker.node("1").unwrap().started_at;
        assert!(tracker.update_status("1", TaskStatus::InProgress, None, None).await);
        assert_eq!(tracker.node("1").unwrap().started_at, started);

        assert!(
            tracker
                .update_status("1", TaskStatus::Completed, Some(json!("ok")), None)
                .await
        );
        let node = tracker.node("1").unwrap();
        assert_eq!(node.result, Some(json!("ok")));
        assert!(node.actual_duration.is_some());
        assert!(node.started_at <= node.completed_at);
    }

    #[tokio::test]
    async fn test_unknown_and_terminal_updates_are_refused() {
        let tracker = ProgressTracker::new(tree());
        assert!(!tracker.update_status("42", TaskStatus::Completed, None, None).await);

        tracker
            .update_status("1", TaskStatus::Failed, None, Some("boom".into()))
            .await;
        assert!(!tracker.update_status("1", TaskStatus::Completed, None, None).await);

        let node = tracker.node("1").unwrap();
        assert_eq!(node.status, TaskStatus::Failed);
        assert_eq!(node.error.as_deref(), Some("boom"));
        // never started, so no duration is invented
        assert_eq!(node.actual_duration, None);
    }

    #[tokio::test]
    async fn test_summary_is_idempotent() {
        let tracker = ProgressTracker::new(tree());
        tracker.start_tracking().await;
        tracker.update_status("1", TaskStatus::InProgress, None, None).await;

        let a = tracker.progress_summary();
        let b = tracker.progress_summary();
        assert_eq!(a.counts, b.counts);
        assert_eq!(a.overall_progress, b.overall_progress);
        assert_eq!(a.current_task_id.as_deref(), Some("1"));
        assert_eq!(a.current_phase.as_deref(), Some("root"));
    }

    #[tokio::test]
    async fn test_snapshots_only_on_completed_or_failed() {
        let store = MemoryProgressStore::new();
        let tracker = ProgressTracker::new(tree()).with_store(Arc::new(store.clone()));

        tracker.start_tracking().await;
        tracker.update_status("1", TaskStatus::InProgress, None, None).await;
        tracker.update_status("1", TaskStatus::Completed, None, None).await;
        tracker.update_status("2", TaskStatus::Skipped, None, None).await;
        tracker.complete_tracking(true, None).await;

        // start + "1" completed + final
        let snapshots = store.list_snapshots("s-1").await.unwrap();
        assert_eq!(snapshots.len(), 3);

        let loaded = store.load_session("s-1").await.unwrap().unwrap();
        assert_eq!(loaded.session.status, SessionStatus::Completed);
        let latest = loaded.latest_snapshot.unwrap();
        assert_eq!(latest.task_tree.root().status, TaskStatus::Completed);
        assert_eq!(latest.progress_summary.overall_progress, 1.0);
    }

    #[tokio::test]
    async fn test_complete_tracking_failure_records_error() {
        let tracker = ProgressTracker::new(tree());
        tracker.start_tracking().await;
        let summary = tracker
            .complete_tracking(false, Some("execution cancelled".into()))
            .await;

        let root = tracker.node("0").unwrap();
        assert_eq!(root.status, TaskStatus::Failed);
        assert_eq!(root.error.as_deref(), Some("execution cancelled"));
        assert_eq!(summary.counts.failed, 1);

        let frozen = tracker.progress_summary().elapsed_seconds;
        assert_eq!(frozen, summary.elapsed_seconds);
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let tracker = ProgressTracker::new(tree());
        let mut rx = tracker.subscribe();

        tracker.start_tracking().await;
        tracker.update_status("1", TaskStatus::InProgress, None, None).await;

        assert!(matches!(
            rx.recv().await.unwrap(),
            ProgressEvent::TrackingStarted { .. }
        ));
        match rx.recv().await.unwrap() {
            ProgressEvent::StatusChanged { task_id, from, to, .. } => {
                assert_eq!(task_id, "1");
                assert_eq!(from, TaskStatus::Pending);
                assert_eq!(to, TaskStatus::InProgress);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recover_keeps_completed_work() {
        let tracker = ProgressTracker::new(tree());
        tracker.start_tracking().await;
        tracker.update_status("1", TaskStatus::InProgress, None, None).await;
        tracker
            .update_status("1", TaskStatus::Completed, Some(json!(7)), None)
            .await;
        tracker.update_status("2", TaskStatus::InProgress, None, None).await;

        let recovered = ProgressTracker::recover(tracker.snapshot());
        assert_eq!(recovered.status_of("1"), Some(TaskStatus::Completed));
        assert_eq!(recovered.node("1").unwrap().result, Some(json!(7)));
        assert_eq!(recovered.status_of("2"), Some(TaskStatus::Pending));
        assert_eq!(recovered.node("2").unwrap().started_at, None);
        assert_eq!(recovered.status_of("0"), Some(TaskStatus::Pending));
    }

    struct BrokenStore;

    #[async_trait]
    impl ProgressStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }

        async fn create_session(
            &self,
            _tree: &TaskTree,
        ) -> Result<crate::state::SessionRecord, StoreError> {
            Err(StoreError::InvalidSessionId("broken".into()))
        }

        async fn update_session_status(
            &self,
            session_id: &str,
            _status: SessionStatus,
        ) -> Result<crate::state::SessionRecord, StoreError> {
            Err(StoreError::SessionNotFound(session_id.into()))
        }

        async fn append_snapshot(
            &self,
            session_id: &str,
            _tree: &TaskTree,
            _summary: &ProgressSummary,
        ) -> Result<crate::state::SnapshotRecord, StoreError> {
            Err(StoreError::SessionNotFound(session_id.into()))
        }

        async fn load_session(
            &self,
            _session_id: &str,
        ) -> Result<Option<crate::state::LoadedSession>, StoreError> {
            Ok(None)
        }

        async fn list_snapshots(
            &self,
            session_id: &str,
        ) -> Result<Vec<crate::state::SnapshotRecord>, StoreError> {
            Err(StoreError::SessionNotFound(session_id.into()))
        }

        async fn list_sessions(
            &self,
            _status: Option<SessionStatus>,
        ) -> Result<Vec<crate::state::SessionRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn delete_session(&self, _session_id: &str) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn delete_sessions_older_than(
            &self,
            _age: chrono::Duration,
        ) -> Result<usize, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_store_failures_do_not_interrupt_tracking() {
        let tracker = ProgressTracker::new(tree()).with_store(Arc::new(BrokenStore));
        tracker.start_tracking().await;
        assert!(
            tracker
                .update_status("1", TaskStatus::Failed, None, Some("x".into()))
                .await
        );
        let summary = tracker.complete_tracking(false, None).await;
        assert_eq!(summary.counts.failed, 2);
    }
}
