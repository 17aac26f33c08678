//! In-process progress store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::model::{ProgressSummary, TaskTree};

use super::session::{SessionRecord, SessionStatus};
use super::snapshot::SnapshotRecord;
use super::store::{LoadedSession, ProgressStore};

struct StoredSession {
    record: SessionRecord,
    snapshots: Vec<SnapshotRecord>,
}

/// Store that keeps everything in memory. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryProgressStore {
    sessions: Arc<RwLock<HashMap<String, StoredSession>>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_session(&self, tree: &TaskTree) -> Result<SessionRecord, StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&tree.session_id) {
            return Err(StoreError::SessionExists(tree.session_id.clone()));
        }

        let record = SessionRecord::new(tree);
        sessions.insert(
            tree.session_id.clone(),
            StoredSession {
                record: record.clone(),
                snapshots: Vec::new(),
            },
        );
        Ok(record)
    }

    async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<SessionRecord, StoreError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        stored.record.transition_to(status, Utc::now());
        Ok(stored.record.clone())
    }

    async fn append_snapshot(
        &self,
        session_id: &str,
        tree: &TaskTree,
        summary: &ProgressSummary,
    ) -> Result<SnapshotRecord, StoreError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;

        let sequence = stored.snapshots.len() as u64 + 1;
        let snapshot = SnapshotRecord::new(session_id, sequence, tree, summary);
        stored.snapshots.push(snapshot.clone());
        stored.record.updated_at = snapshot.created_at;
        Ok(snapshot)
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<LoadedSession>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).map(|stored| LoadedSession {
            session: stored.record.clone(),
            latest_snapshot: stored.snapshots.last().cloned(),
        }))
    }

    async fn list_snapshots(&self, session_id: &str) -> Result<Vec<SnapshotRecord>, StoreError> {
        let sessions = self.sessions.read().await;
        let stored = sessions
            .get(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        Ok(stored.snapshots.iter().rev().cloned().collect())
    }

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut records: Vec<SessionRecord> = sessions
            .values()
            .map(|stored| &stored.record)
            .filter(|record| status.map_or(true, |s| record.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn delete_sessions_older_than(
        &self,
        age: chrono::Duration,
    ) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - age;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, stored| stored.record.created_at >= cutoff);
        Ok(before - sessions.len())
    }
}
