use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use wayfarer_core::{HubConfig, WatchConfig, WorkerLauncher};

/// Subcommand the server re-executes itself with to run one operation.
pub const WORKER_SUBCOMMAND: &str = "worker";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3030;
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub watch: WatchSettings,
    pub worker: WorkerConfig,
    #[serde(skip)]
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchSettings {
    pub debounce_ms: u64,
    pub sniff_mime: bool,
}

/// How operation processes are launched.
///
/// `program: None` means the running binary with the `worker` subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WorkerConfig {
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
}

/// Where the configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
            },
            watch: WatchSettings {
                debounce_ms: DEFAULT_DEBOUNCE_MS,
                sniff_mime: false,
            },
            worker: WorkerConfig::default(),
            metadata: ConfigMetadata::default(),
        }
    }
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            debounce_window: Duration::from_millis(self.watch.debounce_ms),
            sniff_mime: self.watch.sniff_mime,
        }
    }

    /// Launcher for operation processes, falling back to this executable.
    pub fn worker_launcher(&self) -> wayfarer_core::Result<WorkerLauncher> {
        match &self.worker.program {
            Some(program) => Ok(WorkerLauncher::new(program, self.worker.args.clone())),
            None => WorkerLauncher::current_exe(WORKER_SUBCOMMAND),
        }
    }

    pub fn hub_config(&self) -> wayfarer_core::Result<HubConfig> {
        Ok(HubConfig::new(self.worker_launcher()?).with_watch(self.watch_config()))
    }
}
