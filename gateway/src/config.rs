//! Configuration for the embed-dispatch service.

use std::collections::BTreeMap;
use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use embed_dispatch_common::ModelConfig;
use embed_worker::{EnginesConfig, WorkerConfig};
use serde::Deserialize;

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "EMBED_DISPATCH_CONFIG";

/// Prefix of environment overrides (EMBED_DISPATCH__SECTION__KEY).
pub const ENV_PREFIX: &str = "EMBED_DISPATCH";

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub engines: EnginesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Embedding models keyed by model key.
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest number of texts accepted in one batch request.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// How long task records stay retrievable.
    #[serde(default = "default_result_ttl")]
    pub result_ttl_secs: u64,
    /// Interval of the background sweep evicting expired records.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl StoreConfig {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            result_ttl_secs: default_result_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_service_name() -> String {
    "embed-dispatch".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_max_batch_size() -> usize {
    64
}
fn default_result_ttl() -> u64 {
    3600
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (EMBED_DISPATCH__SECTION__KEY format)
    /// 2. The file named by EMBED_DISPATCH_CONFIG, or config.toml (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from(File::with_name(&path).required(true)),
            Err(_) => Self::load_from(File::with_name("config").required(false)),
        }
    }

    /// Load configuration from a specific file, still honouring environment overrides.
    pub fn load_from<S>(file: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = ConfigLoader::builder()
            // Set defaults
            .set_default("api.host", default_host())?
            .set_default("api.port", default_port() as i64)?
            .set_default("logging.level", default_log_level())?
            .add_source(file)
            // Override with environment variables (EMBED_DISPATCH__SECTION__KEY format)
            .add_source(environment())
            .build()?;

        config.try_deserialize()
    }
}

/// Environment source; `EMBED_DISPATCH__WORKER__MODELS` takes a comma-separated list.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("worker.models")
}
