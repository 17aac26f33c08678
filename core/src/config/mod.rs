pub mod load;
pub mod types;

pub use load::{get_data_dir, load_default, load_from_path, open_store};
pub use types::{EngineConfig, LoggingConfig, StoreConfig};
