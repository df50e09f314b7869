use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::DomainError;
use crate::infrastructure::cache::{CacheConfig, CacheType};
use crate::infrastructure::memo::{CacheOptions, DEFAULT_TTL};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheSettings,
    pub memo: MemoSettings,
    pub logging: LoggingConfig,
}

/// Backend selection and tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// `in_memory`, `redis` or `file`
    pub backend: String,
    pub redis_url: Option<String>,
    pub key_prefix: Option<String>,
    pub directory: Option<PathBuf>,
    pub max_capacity: u64,
    pub time_to_idle_secs: Option<u64>,
    pub connection_timeout_secs: Option<u64>,
}

/// Defaults applied to memoized callables
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoSettings {
    /// Entry lifetime in seconds, 0 for no expiry
    pub default_ttl: u64,
    pub version: u32,
    pub single_flight: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheType::InMemory.to_string(),
            redis_url: None,
            key_prefix: None,
            directory: None,
            max_capacity: 10_000,
            time_to_idle_secs: None,
            connection_timeout_secs: None,
        }
    }
}

impl Default for MemoSettings {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL.as_secs(),
            version: 1,
            single_flight: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl CacheSettings {
    /// Converts the settings into a factory configuration
    pub fn to_cache_config(&self) -> Result<CacheConfig, DomainError> {
        Ok(CacheConfig {
            cache_type: self.backend.parse()?,
            redis_url: self.redis_url.clone(),
            directory: self.directory.clone(),
            key_prefix: self.key_prefix.clone(),
            max_capacity: Some(self.max_capacity),
            time_to_idle: self.time_to_idle_secs.map(Duration::from_secs),
            connection_timeout: self.connection_timeout_secs.map(Duration::from_secs),
        })
    }
}

impl MemoSettings {
    pub fn ttl(&self) -> Option<Duration> {
        (self.default_ttl > 0).then(|| Duration::from_secs(self.default_ttl))
    }

    pub fn options(&self) -> CacheOptions {
        CacheOptions {
            ttl: self.ttl(),
            version: self.version,
            single_flight: self.single_flight,
            ..CacheOptions::default()
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("MEMO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
