pub mod command;

pub use command::{CommandRunner, CONTEXT_ENV, TASK_ID_ENV};
