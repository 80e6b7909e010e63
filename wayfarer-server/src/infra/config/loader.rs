use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::models::{Config, ConfigMetadata, ServerConfig, WatchSettings, WorkerConfig};
use super::sources::{EnvConfig, FileConfig};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["wayfarer.toml", "config/wayfarer.toml"];

/// Values given on the command line; they win over every other source.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub debounce_ms: Option<u64>,
    pub sniff_mime: Option<bool>,
    pub worker_program: Option<PathBuf>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.options.overrides = overrides;
        self
    }

    /// Load `.env`, then compose defaults, file, environment and overrides.
    pub fn load(&self) -> Result<Config, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        let mut config = self.load_from_env(EnvConfig::gather()?)?;
        config.metadata.env_file_loaded = env_file_loaded;
        Ok(config)
    }

    /// Compose from an already gathered environment.
    pub fn load_from_env(&self, env: EnvConfig) -> Result<Config, ConfigLoadError> {
        let (file, config_path) = self.load_file_config(&env)?;
        Ok(self.compose(file.unwrap_or_default(), env, config_path))
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigLoadError::MissingConfig { path });
                }
                path
            }
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let file = read_file_config(&path)?;
        Ok((Some(file), Some(path)))
    }

    fn compose(&self, file: FileConfig, env: EnvConfig, config_path: Option<PathBuf>) -> Config {
        let overrides = &self.options.overrides;
        let defaults = Config::default();

        let server = ServerConfig {
            host: overrides
                .host
                .clone()
                .or(env.server_host)
                .or(file.server.host)
                .unwrap_or(defaults.server.host),
            port: overrides
                .port
                .or(env.server_port)
                .or(file.server.port)
                .unwrap_or(defaults.server.port),
        };

        let watch = WatchSettings {
            debounce_ms: overrides
                .debounce_ms
                .or(env.debounce_ms)
                .or(file.watch.debounce_ms)
                .unwrap_or(defaults.watch.debounce_ms),
            sniff_mime: overrides
                .sniff_mime
                .or(env.sniff_mime)
                .or(file.watch.sniff_mime)
                .unwrap_or(defaults.watch.sniff_mime),
        };

        let program = overrides
            .worker_program
            .clone()
            .or(env.worker_program)
            .or(file.worker.program);
        // Extra args only make sense for the program they were written for.
        let args = match (&program, file.worker.args) {
            (Some(_), Some(args)) => args,
            _ => Vec::new(),
        };

        Config {
            server,
            watch,
            worker: WorkerConfig { program, args },
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
            },
        }
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
