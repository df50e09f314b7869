//! Layered configuration: `config/default`, `config/local`, then `MEMO__*` env vars

mod app_config;

pub use app_config::{AppConfig, CacheSettings, LogFormat, LoggingConfig, MemoSettings};
