//! Phase-based execution of a task tree.
//!
//! The coordinator turns a validated [`TaskTree`](crate::model::TaskTree)
//! into ordered phases, runs each phase either one task at a time or
//! concurrently, and reports every transition through a
//! [`ProgressTracker`](crate::tracker::ProgressTracker).
//!
//! # Architecture
//!
//! ```text
//! TaskTree
//!   ↓
//! build_plan() → validate() → Kahn layering
//!   ↓
//! Vec<ExecutionPhase { task_ids, strategy }>
//!   ↓
//! Coordinator::execute_tracked()
//!   ├─ Sequential → execute_phase_sequential() (stops on cancel)
//!   └─ Parallel   → execute_phase_parallel()   (bounded by max_parallel)
//!        ↓
//!   run_task() → deps satisfied? → TaskRunner::run (via Resilience)
//!   ↓
//! ExecutionResult
//! ```

mod cancel;
mod engine;
mod plan;
mod scheduler;
pub mod traits;
pub mod types;

pub use cancel::CancellationFlag;
pub use engine::{Coordinator, CoordinatorBuilder, CANCELLED_MESSAGE};
pub use plan::{build_plan, ExecutionPhase, PhaseStrategy};
pub use scheduler::{execute_phase_parallel, execute_phase_sequential};
pub use traits::{GraphProducer, Resilience, TaskOperation, TaskRunner};
pub use types::{
    CoordinatorConfig, ExecutionResult, ParentContext, RetryConfig, RunOutcome, TaskContext,
};
