use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{ProgressSummary, TaskTree};

use super::session::{SessionRecord, SessionStatus};
use super::snapshot::SnapshotRecord;

/// A session together with its most recent snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSession {
    pub session: SessionRecord,
    pub latest_snapshot: Option<SnapshotRecord>,
}

impl LoadedSession {
    /// Tree to recover from: the latest snapshot, else the initial tree.
    pub fn recovery_tree(&self) -> &TaskTree {
        self.latest_snapshot
            .as_ref()
            .map(|s| &s.task_tree)
            .unwrap_or(&self.session.task_tree)
    }
}

/// Durable persistence of sessions and their snapshots.
///
/// Snapshots are append-only and ordered by insertion. Implementations must
/// be safe to share between concurrently running tasks.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    fn name(&self) -> &str;

    /// Register a new session in `pending` status.
    async fn create_session(&self, tree: &TaskTree) -> Result<SessionRecord, StoreError>;

    async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<SessionRecord, StoreError>;

    async fn append_snapshot(
        &self,
        session_id: &str,
        tree: &TaskTree,
        summary: &ProgressSummary,
    ) -> Result<SnapshotRecord, StoreError>;

    async fn load_session(&self, session_id: &str) -> Result<Option<LoadedSession>, StoreError>;

    /// All snapshots of a session, most recent first.
    async fn list_snapshots(&self, session_id: &str) -> Result<Vec<SnapshotRecord>, StoreError>;

    /// Sessions newest first, optionally restricted to one status.
    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<SessionRecord>, StoreError>;

    /// Remove a session and its snapshots. Returns false if it did not exist.
    async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError>;

    /// Remove every session created more than `age` ago. Returns the count.
    async fn delete_sessions_older_than(&self, age: chrono::Duration)
        -> Result<usize, StoreError>;
}
