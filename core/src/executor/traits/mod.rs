pub mod producer;
pub mod resilience;
pub mod runner;

pub use producer::*;
pub use resilience::*;
pub use runner::*;
