//! taskweave core: dependency-aware execution of hierarchical task trees.
//!
//! A [`TaskTree`] is laid out into phases, run through a [`Coordinator`],
//! and observed through a [`ProgressTracker`] that can persist snapshots to a
//! [`ProgressStore`] for crash recovery.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod model;
pub mod state;
pub mod tracker;

pub use error::{ExecutorError, StoreError};
pub use executor::{
    CancellationFlag, Coordinator, CoordinatorBuilder, ExecutionResult, GraphProducer,
    Resilience, RunOutcome, TaskContext, TaskRunner,
};
pub use model::{
    ExecutionStrategy, ProgressSummary, TaskNode, TaskSpec, TaskStatus, TaskTree, TaskTreeBuilder,
};
pub use state::{FileProgressStore, MemoryProgressStore, ProgressStore};
pub use tracker::{ProgressEvent, ProgressTracker};
