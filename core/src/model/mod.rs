//! Task graph data model: nodes, the tree container and derived progress.

pub mod builder;
pub mod id;
mod node;
mod summary;
mod tree;

pub use builder::{TaskSpec, TaskTreeBuilder};
pub use id::hierarchical_cmp;
pub use node::{TaskNode, TaskStatus};
pub use summary::{estimate_remaining, phase_label, ProgressSummary, StatusCounts};
pub use tree::{ExecutionStrategy, TaskTree};
