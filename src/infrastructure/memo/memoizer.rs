//! Get-or-compute protocol over a cache backend

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::domain::DomainError;
use crate::domain::cache::{Cache, CacheExt, CacheKey, CallArgs, KeyBuilder, KeyError, escape_glob};

use super::locks::KeyLocks;

/// Result of a computation, telling the memoizer whether to keep it
#[derive(Debug, Clone, PartialEq)]
pub enum Computed<T> {
    /// Write the value to the backend
    Store(T),
    /// Return the value without caching it
    Skip(T),
}

impl<T> Computed<T> {
    pub fn into_inner(self) -> T {
        match self {
            Computed::Store(value) | Computed::Skip(value) => value,
        }
    }
}

/// Caches one callable's results in a shared backend
///
/// Caching never changes what a call returns: keys that cannot be built fall
/// back to a direct call, backend failures are logged and treated as a miss
/// or a no-op, and errors from the computation are returned unchanged and
/// never stored.
#[derive(Debug, Clone)]
pub struct Memoizer {
    backend: Arc<dyn Cache>,
    keys: KeyBuilder,
    ttl: Option<Duration>,
    locks: Option<Arc<KeyLocks>>,
}

impl Memoizer {
    pub fn new(backend: Arc<dyn Cache>, keys: KeyBuilder, ttl: Option<Duration>) -> Self {
        Self {
            backend,
            keys,
            ttl,
            locks: None,
        }
    }

    /// Serializes lookup, compute and store per key through `locks`
    pub fn with_locks(mut self, locks: Arc<KeyLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn backend(&self) -> &Arc<dyn Cache> {
        &self.backend
    }

    pub fn key_builder(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn is_single_flight(&self) -> bool {
        self.locks.is_some()
    }

    pub fn key(&self, args: &CallArgs) -> Result<CacheKey, KeyError> {
        self.keys.build(args)
    }

    /// Returns the cached value for `args`, computing and storing it on a miss
    pub async fn get_or_compute<T, E, F, Fut>(&self, args: &CallArgs, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_or_compute_with(args, move || async move { compute().await.map(Computed::Store) })
            .await
    }

    /// Like [`get_or_compute`](Self::get_or_compute), but the computation
    /// decides per result whether it is stored
    pub async fn get_or_compute_with<T, E, F, Fut>(
        &self,
        args: &CallArgs,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed<T>, E>>,
    {
        let callable = self.keys.signature().name();

        let key = match self.key(args) {
            Ok(key) => key,
            Err(KeyError::Skipped) => {
                tracing::debug!(callable = %callable, "Key strategy skipped caching");
                return compute().await.map(Computed::into_inner);
            }
            Err(e) => {
                tracing::warn!(callable = %callable, error = %e, "Calling through without cache");
                return compute().await.map(Computed::into_inner);
            }
        };

        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(key.as_str()).await),
            None => None,
        };

        if let Some(value) = self.lookup(&key).await {
            return Ok(value);
        }

        match compute().await? {
            Computed::Store(value) => {
                self.store(&key, &value).await;
                Ok(value)
            }
            Computed::Skip(value) => {
                tracing::debug!(key = %key, "Computed value marked as not cacheable");
                Ok(value)
            }
        }
    }

    async fn lookup<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: DeserializeOwned + Send,
    {
        match self.backend.get(key.as_str()).await {
            Ok(Some(value)) => {
                tracing::debug!(key = %key, "Value obtained from cache");
                Some(value)
            }
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn store<T>(&self, key: &CacheKey, value: &T)
    where
        T: Serialize + Send + Sync,
    {
        match self.backend.set(key.as_str(), value, self.ttl).await {
            Ok(()) => tracing::debug!(key = %key, ttl = ?self.ttl, "Value calculated and stored"),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to store calculated value");
            }
        }
    }

    /// Removes the entry for `args`, returning whether one existed
    pub async fn delete(&self, args: &CallArgs) -> Result<bool, DomainError> {
        let key = self.key(args)?;
        self.backend.delete(key.as_str()).await
    }

    pub async fn exists(&self, args: &CallArgs) -> Result<bool, DomainError> {
        let key = self.key(args)?;
        self.backend.exists(key.as_str()).await
    }

    /// Remaining lifetime of the entry for `args`
    pub async fn remaining_ttl(&self, args: &CallArgs) -> Result<Option<Duration>, DomainError> {
        let key = self.key(args)?;
        self.backend.ttl(key.as_str()).await
    }

    /// Deletes every entry under this callable's namespace
    pub async fn clear(&self) -> Result<usize, DomainError> {
        let pattern = format!("{}*", escape_glob(self.keys.namespace()));
        let deleted = self.backend.delete_pattern(&pattern).await?;

        tracing::debug!(
            namespace = %self.keys.namespace(),
            deleted = deleted,
            "Cleared cached entries"
        );

        Ok(deleted)
    }
}
