//! Progress tracker: the single mutation point for task status.
//!
//! The coordinator never writes node fields itself. It requests transitions
//! here, and the tracker stamps timestamps, keeps the summary current,
//! publishes [`ProgressEvent`]s and writes snapshots to the progress store on
//! Completed/Failed transitions.

mod events;
mod tracker;

pub use events::ProgressEvent;
pub use tracker::ProgressTracker;
