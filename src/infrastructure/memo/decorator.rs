//! Wrap-time configuration of memoized callables

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::cache::{
    Cache, CallArguments, DEFAULT_KEY_VERSION, KeyBuilder, KeyStrategy, Signature,
};

use super::locks::KeyLocks;
use super::memoized::Memoized;
use super::memoizer::Memoizer;

/// Lifetime of cached results when none is configured
pub const DEFAULT_TTL: Duration = Duration::from_secs(900);

/// Options applied to every callable wrapped by one decorator
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOptions {
    /// Entry lifetime, `None` for no expiry
    pub ttl: Option<Duration>,
    /// Replaces the callable's qualified name as key namespace
    pub key_prefix: Option<String>,
    /// Parameters excluded from key derivation
    pub ignore_args: Vec<String>,
    /// Folded into every key; bump it when results change meaning
    pub version: u32,
    /// Compute at most once per key at a time within this process
    pub single_flight: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: Some(DEFAULT_TTL),
            key_prefix: None,
            ignore_args: Vec::new(),
            version: DEFAULT_KEY_VERSION,
            single_flight: false,
        }
    }
}

/// Builds memoized callables over one shared backend
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use memocache::domain::cache::Signature;
/// use memocache::infrastructure::cache::InMemoryCache;
/// use memocache::infrastructure::memo::CacheDecorator;
///
/// # #[tokio::main]
/// # async fn main() {
/// let slow_add = CacheDecorator::new(Arc::new(InMemoryCache::new()))
///     .with_ttl(Duration::from_secs(60))
///     .wrap(
///         Signature::function("demo", "slow_add").param("a").param("b"),
///         |(a, b): (i64, i64)| async move { Ok::<_, std::convert::Infallible>(a + b) },
///     );
///
/// assert_eq!(slow_add.call((2, 3)).await, Ok(5));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CacheDecorator {
    backend: Arc<dyn Cache>,
    options: CacheOptions,
    strategy: Option<Arc<dyn KeyStrategy>>,
    locks: Arc<KeyLocks>,
}

impl CacheDecorator {
    pub fn new(backend: Arc<dyn Cache>) -> Self {
        Self {
            backend,
            options: CacheOptions::default(),
            strategy: None,
            locks: Arc::new(KeyLocks::new()),
        }
    }

    pub fn with_options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = Some(ttl);
        self
    }

    /// Stores results until explicitly deleted or evicted
    pub fn without_expiry(mut self) -> Self {
        self.options.ttl = None;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.key_prefix = Some(prefix.into());
        self
    }

    pub fn ignoring<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options
            .ignore_args
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.options.version = version;
        self
    }

    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.options.single_flight = enabled;
        self
    }

    pub fn with_key_strategy(mut self, strategy: Arc<dyn KeyStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn backend(&self) -> &Arc<dyn Cache> {
        &self.backend
    }

    /// Memoizer for the callable described by `signature`
    pub fn memoizer(&self, signature: Signature) -> Memoizer {
        let mut keys = KeyBuilder::new(signature)
            .with_version(self.options.version)
            .ignoring(self.options.ignore_args.iter().cloned());

        if let Some(prefix) = &self.options.key_prefix {
            keys = keys.with_namespace(prefix.clone());
        }

        if let Some(strategy) = &self.strategy {
            keys = keys.with_strategy(strategy.clone());
        }

        let memoizer = Memoizer::new(self.backend.clone(), keys, self.options.ttl);

        if self.options.single_flight {
            memoizer.with_locks(self.locks.clone())
        } else {
            memoizer
        }
    }

    /// Wraps `func` so calls go through the cache
    pub fn wrap<I, F, Fut>(&self, signature: Signature, func: F) -> Memoized<I, F>
    where
        I: CallArguments,
        F: Fn(I) -> Fut,
        Fut: Future,
    {
        Memoized::new(self.memoizer(signature), func)
    }
}
