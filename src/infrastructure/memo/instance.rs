//! Result cache owned by a single object

use std::sync::Arc;

use crate::domain::DomainError;
use crate::domain::cache::{Cache, ParamKind, Signature};
use crate::infrastructure::cache::InMemoryCache;

use super::decorator::CacheDecorator;
use super::memoizer::Memoizer;

/// In-memory store embedded in the object whose methods it caches
///
/// Entries never expire and die with the owner. Since the store already
/// belongs to one instance, the receiver is left out of every key.
#[derive(Debug, Clone)]
pub struct InstanceCache {
    store: Arc<InMemoryCache>,
    decorator: CacheDecorator,
}

impl InstanceCache {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryCache::new());
        let decorator = CacheDecorator::new(store.clone()).without_expiry();

        Self { store, decorator }
    }

    /// Memoizer for one method of the owner
    pub fn memoizer(&self, signature: Signature) -> Memoizer {
        let receivers: Vec<String> = signature
            .params()
            .iter()
            .filter(|p| p.kind() == ParamKind::Receiver)
            .map(|p| p.name().to_string())
            .collect();

        self.decorator.clone().ignoring(receivers).memoizer(signature)
    }

    /// Number of cached results
    pub async fn len(&self) -> Result<usize, DomainError> {
        self.store.size().await
    }

    pub async fn is_empty(&self) -> Result<bool, DomainError> {
        Ok(self.len().await? == 0)
    }

    /// Drops every cached result of the owner
    pub async fn clear(&self) -> Result<(), DomainError> {
        self.store.clear().await
    }
}

impl Default for InstanceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::CallArgs;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Owner holding a connection that cannot be serialized
    struct Catalog {
        cache: InstanceCache,
        lookups: AtomicUsize,
    }

    impl Catalog {
        fn new() -> Self {
            Self {
                cache: InstanceCache::new(),
                lookups: AtomicUsize::new(0),
            }
        }

        async fn price(&self, sku: &str) -> u64 {
            let memo = self.cache.memoizer(
                Signature::method("shop", "Catalog", "price")
                    .receiver("self")
                    .param("sku"),
            );
            let args = CallArgs::new().opaque_receiver("catalog connection").arg(sku);
            let lookups = &self.lookups;
            let len = sku.len() as u64;

            memo.get_or_compute(&args, move || async move {
                lookups.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(len * 100)
            })
            .await
            .unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn test_receiver_is_not_part_of_key() {
        let catalog = Catalog::new();

        assert_eq!(catalog.price("abc").await, 300);
        assert_eq!(catalog.price("abc").await, 300);
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(catalog.cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_instances_do_not_share_results() {
        let first = Catalog::new();
        let second = Catalog::new();

        first.price("abc").await;
        second.price("abc").await;

        assert_eq!(first.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(second.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entries_do_not_expire() {
        let cache = InstanceCache::new();
        let memo = cache.memoizer(Signature::function("shop", "banner"));

        assert_eq!(memo.ttl(), None);
    }

    #[tokio::test]
    async fn test_clear() {
        let catalog = Catalog::new();
        catalog.price("a").await;
        catalog.price("bb").await;

        assert_eq!(catalog.cache.len().await.unwrap(), 2);
        catalog.cache.clear().await.unwrap();

        assert!(catalog.cache.is_empty().await.unwrap());
        catalog.price("a").await;
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 3);
    }
}
