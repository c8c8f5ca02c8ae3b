use crate::dedupe::verify::VerifySettings;
use crate::engine::{default_workers, EngineSettings};
use crate::hasher::HashAlgorithm;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Folders ingested one batch each, in order.
    pub batches: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub hash_algorithm: HashAlgorithm,
    pub workers: usize,
    pub readiness_attempts: u32,
    pub readiness_backoff_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            batches: Vec::new(),
            ignore_patterns: Vec::new(),
            hash_algorithm: HashAlgorithm::default(),
            workers: default_workers(),
            readiness_attempts: 10,
            readiness_backoff_ms: 1000,
        }
    }
}

impl AppConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            hash_algorithm: self.hash_algorithm,
            workers: self.workers.max(1),
            verify: VerifySettings {
                readiness_attempts: self.readiness_attempts,
                readiness_backoff: Duration::from_millis(self.readiness_backoff_ms),
            },
        }
    }
}

/// Optional `Config.{toml,json,yaml}` in the working directory, overlaid by
/// `QUEUE_DEDUPE_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    load_from(Config::builder().add_source(ConfigFile::with_name("Config").required(false)))
}

fn load_from(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<AppConfig, ConfigError> {
    builder
        .add_source(
            Environment::with_prefix("QUEUE_DEDUPE")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("batches")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?
        .try_deserialize::<AppConfig>()
}
