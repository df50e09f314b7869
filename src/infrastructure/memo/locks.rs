//! Per-key mutual exclusion for single-flight memoization

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Registry of async locks keyed by cache key
///
/// Entries exist only while some task holds or awaits the lock.
#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, KeyLock>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`
    pub async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let lock = self.registry().entry(key.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;

        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently locked or awaited
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, KeyLock>> {
        // The map stays consistent even if a holder panicked
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds one key's lock; releasing the last holder drops the entry
#[derive(Debug)]
pub struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut registry = self.owner.registry();

        if registry
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            registry.remove(&self.key);
        }
    }
}
