pub mod config;
pub mod loader;
pub mod logging;
pub mod report;

pub use config::{ConfigError, EngineConfig};
pub use loader::{BracketLoader, BracketLoaderError, BracketRecord};
pub use logging::init_logging;
