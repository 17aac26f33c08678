//! Progress store: durable sessions and append-only snapshots.
//!
//! A session is one execution attempt. Snapshots capture the full task tree
//! plus its progress summary and are never modified after being written;
//! recovery always starts from the most recent one.

pub mod file;
pub mod memory;
pub mod session;
pub mod snapshot;
pub mod store;

pub use file::FileProgressStore;
pub use memory::MemoryProgressStore;
pub use session::{SessionRecord, SessionStatus};
pub use snapshot::SnapshotRecord;
pub use store::{LoadedSession, ProgressStore};
