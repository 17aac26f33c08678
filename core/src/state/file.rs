//! JSON-file progress store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<session_id>/session.json
//! <root>/<session_id>/snapshots/0000000001.json
//! <root>/<session_id>/snapshots/0000000002.json
//! ```
//!
//! Snapshot file names carry the insertion sequence, so ordering survives
//! restarts and does not depend on file modification times.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::model::{ProgressSummary, TaskTree};

use super::session::{SessionRecord, SessionStatus};
use super::snapshot::SnapshotRecord;
use super::store::{LoadedSession, ProgressStore};

const SESSION_FILE: &str = "session.json";
const SNAPSHOT_DIR: &str = "snapshots";

/// Progress store persisting sessions as JSON documents in a directory.
pub struct FileProgressStore {
    root: PathBuf,
    /// Serializes writers so snapshot sequence numbers stay unique.
    write_lock: Mutex<()>,
}

impl FileProgressStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::io(&root, e))?;

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        validate_session_id(session_id)?;
        Ok(self.root.join(session_id))
    }

    async fn read_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let path = self.session_dir(session_id)?.join(SESSION_FILE);
        read_json_opt(&path).await
    }

    async fn require_session(&self, session_id: &str) -> Result<SessionRecord, StoreError> {
        self.read_session(session_id)
            .await?
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))
    }

    async fn write_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let path = self.session_dir(&record.session_id)?.join(SESSION_FILE);
        write_json_atomic(&path, record).await
    }

    /// Snapshot files of a session sorted by ascending sequence.
    async fn snapshot_files(&self, session_id: &str) -> Result<Vec<(u64, PathBuf)>, StoreError> {
        let dir = self.session_dir(session_id)?.join(SNAPSHOT_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let sequence = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok());
            if let Some(sequence) = sequence {
                files.push((sequence, path));
            }
        }

        files.sort_by_key(|(sequence, _)| *sequence);
        Ok(files)
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn create_session(&self, tree: &TaskTree) -> Result<SessionRecord, StoreError> {
        let _guard = self.write_lock.lock().await;

        let dir = self.session_dir(&tree.session_id)?;
        if fs::try_exists(dir.join(SESSION_FILE))
            .await
            .map_err(|e| StoreError::io(&dir, e))?
        {
            return Err(StoreError::SessionExists(tree.session_id.clone()));
        }

        let snapshots = dir.join(SNAPSHOT_DIR);
        fs::create_dir_all(&snapshots)
            .await
            .map_err(|e| StoreError::io(&snapshots, e))?;

        let record = SessionRecord::new(tree);
        self.write_session(&record).await?;
        tracing::debug!(session_id = %record.session_id, dir = %dir.display(), "session created");
        Ok(record)
    }

    async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<SessionRecord, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut record = self.require_session(session_id).await?;
        record.transition_to(status, Utc::now());
        self.write_session(&record).await?;
        Ok(record)
    }

    async fn append_snapshot(
        &self,
        session_id: &str,
        tree: &TaskTree,
        summary: &ProgressSummary,
    ) -> Result<SnapshotRecord, StoreError> {
        let _guard = self.write_lock.lock().await;

        // The session must exist before snapshots can be attached.
        self.require_session(session_id).await?;

        let next = self
            .snapshot_files(session_id)
            .await?
            .last()
            .map(|(sequence, _)| sequence + 1)
            .unwrap_or(1);

        let snapshot = SnapshotRecord::new(session_id, next, tree, summary);
        let path = self
            .session_dir(session_id)?
            .join(SNAPSHOT_DIR)
            .join(format!("{next:010}.json"));
        write_json_atomic(&path, &snapshot).await?;
        Ok(snapshot)
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<LoadedSession>, StoreError> {
        let Some(session) = self.read_session(session_id).await? else {
            return Ok(None);
        };

        let latest_snapshot = match self.snapshot_files(session_id).await?.last() {
            Some((_, path)) => read_json_opt(path).await?,
            None => None,
        };

        Ok(Some(LoadedSession {
            session,
            latest_snapshot,
        }))
    }

    async fn list_snapshots(&self, session_id: &str) -> Result<Vec<SnapshotRecord>, StoreError> {
        self.require_session(session_id).await?;

        let mut snapshots = Vec::new();
        for (_, path) in self.snapshot_files(session_id).await?.iter().rev() {
            if let Some(snapshot) = read_json_opt(path).await? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))?;

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            let path = entry.path().join(SESSION_FILE);
            match read_json_opt::<SessionRecord>(&path).await {
                Ok(Some(record)) => {
                    if status.map_or(true, |s| record.status == s) {
                        records.push(record);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable session");
                }
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;

        let dir = self.session_dir(session_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&dir, e)),
        }
    }

    async fn delete_sessions_older_than(
        &self,
        age: chrono::Duration,
    ) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - age;
        let expired: Vec<String> = self
            .list_sessions(None)
            .await?
            .into_iter()
            .filter(|record| record.created_at < cutoff)
            .map(|record| record.session_id)
            .collect();

        let mut removed = 0;
        for session_id in expired {
            if self.delete_session(&session_id).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "expired sessions deleted");
        }
        Ok(removed)
    }
}

/// Session ids become directory names, so keep them to a safe alphabet.
fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    let valid = !session_id.is_empty()
        && !session_id.starts_with('.')
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidSessionId(session_id.to_string()))
    }
}

async fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read_to_string(path).await {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");

    fs::write(&tmp, json)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}
