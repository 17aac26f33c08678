pub mod file;

pub use file::{FileGraphProducer, PlanFile};
