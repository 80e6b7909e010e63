pub mod loader;
pub mod models;
pub mod sources;

pub use loader::{ConfigLoadError, ConfigLoader, ConfigLoaderOptions, ConfigOverrides};
pub use models::{
    Config, ConfigMetadata, ServerConfig, WORKER_SUBCOMMAND, WatchSettings, WorkerConfig,
};
pub use sources::{EnvConfig, FileConfig};
