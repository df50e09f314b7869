//! memocache
//!
//! Memoization of async functions over pluggable cache backends:
//! - Deterministic keys from a callable's qualified name and bound arguments
//! - Get-or-compute that degrades to a direct call on any caching trouble
//! - In-memory (moka), Redis and filesystem backends behind one trait
//! - Optional per-key single-flight computation

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{
    Cache, CacheExt, CacheKey, CallArgs, CallArguments, DomainError, KeyBuilder, KeyError,
    QualifiedName, Signature,
};
pub use infrastructure::memo::{CacheDecorator, CacheOptions, Computed, Memoized, Memoizer};
