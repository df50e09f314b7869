//! CLI module for memocache
//!
//! Provides subcommands for inspecting and managing memoized results:
//! - `key`: print the cache key of a call
//! - `probe`: exercise the configured backend through a memoized function
//! - `clear`: delete every cached result of one callable

pub mod clear;
pub mod key;
pub mod probe;

use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;
use crate::domain::cache::{Cache, QualifiedName};
use crate::infrastructure::cache::CacheFactory;
use crate::infrastructure::logging;

/// memocache - Memoize async functions over pluggable cache backends
#[derive(Parser)]
#[command(name = "memocache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the cache key for a callable and its arguments
    Key(key::KeyArgs),

    /// Round-trip a memoized call through the configured backend
    Probe(probe::ProbeArgs),

    /// Delete every cached result of a callable
    Clear(clear::ClearArgs),
}

/// Identity of a cached callable as given on the command line
#[derive(Args, Clone, Debug)]
pub struct CallableArgs {
    /// Module path of the callable
    #[arg(long)]
    pub module: String,

    /// Type the callable belongs to, for methods
    #[arg(long)]
    pub owner: Option<String>,

    /// Function or method name
    #[arg(long)]
    pub name: String,

    /// Namespace overriding the qualified name
    #[arg(long)]
    pub key_prefix: Option<String>,
}

impl CallableArgs {
    pub fn qualified_name(&self) -> QualifiedName {
        match &self.owner {
            Some(owner) => QualifiedName::method(&self.module, owner, &self.name),
            None => QualifiedName::function(&self.module, &self.name),
        }
    }
}

/// Loads `.env` and configuration, then installs logging
fn bootstrap() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging);

    Ok(config)
}

/// Builds the backend described by `config`, optionally overriding its type
async fn create_backend(
    config: &AppConfig,
    backend: Option<&str>,
) -> anyhow::Result<Arc<dyn Cache>> {
    let mut settings = config.cache.clone();

    if let Some(backend) = backend {
        settings.backend = backend.to_string();
    }

    let cache_config = settings.to_cache_config()?;
    let cache = CacheFactory::new().create(&cache_config).await?;

    Ok(cache)
}
