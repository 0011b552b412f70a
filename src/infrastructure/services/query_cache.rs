//! Query cache facade - store lifecycle plus fetch and invalidation

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::CacheSettings;
use crate::domain::cache::{CacheKey, CacheStore};
use crate::domain::query::{NormalizedOptions, QueryNormalizer, QueryOptions, ReadDescriptor};
use crate::domain::{DomainError, FetchError};
use crate::infrastructure::cache::CacheStoreFactory;

use super::invalidation_service::InvalidationService;
use super::query_cache_service::{QueryCacheConfig, QueryCacheService};

/// An opened query cache
///
/// Built explicitly with [`QueryCache::open`]; there is no process-wide
/// instance. Call [`QueryCache::close`] to stop background work.
#[derive(Debug, Clone)]
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
    fetcher: QueryCacheService,
    invalidator: InvalidationService,
}

impl QueryCache {
    /// Builds the configured store and the services around it
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(settings: &CacheSettings) -> Result<Self, DomainError> {
        settings.ensure_valid()?;
        let store = CacheStoreFactory::new().create(&settings.store_config())?;

        tracing::info!(
            store_type = %settings.store_type,
            enabled = settings.enabled,
            "Query cache opened"
        );

        Ok(Self::with_store(store, settings.service_config()))
    }

    /// Wraps an existing store
    pub fn with_store(store: Arc<dyn CacheStore>, config: QueryCacheConfig) -> Self {
        Self {
            fetcher: QueryCacheService::with_config(store.clone(), config),
            invalidator: InvalidationService::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn normalizer(&self) -> &QueryNormalizer {
        self.fetcher.normalizer()
    }

    pub fn derive_key(
        &self,
        namespace: &str,
        descriptor: &ReadDescriptor,
        options: &QueryOptions,
    ) -> Result<CacheKey, DomainError> {
        self.fetcher.derive_key(namespace, descriptor, options)
    }

    /// See [`QueryCacheService::fetch`]
    pub async fn fetch<T, E, F, Fut>(
        &self,
        namespace: &str,
        descriptor: &ReadDescriptor,
        options: &QueryOptions,
        executor: F,
    ) -> Result<T, FetchError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(ReadDescriptor, NormalizedOptions) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.fetcher
            .fetch(namespace, descriptor, options, executor)
            .await
    }

    /// See [`InvalidationService::invalidate_namespace`]
    pub async fn invalidate_namespace(&self, namespace: &str) -> usize {
        self.invalidator.invalidate_namespace(namespace).await
    }

    /// Stops background work on the store
    pub async fn close(&self) -> Result<(), DomainError> {
        self.store.close().await?;
        tracing::info!("Query cache closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::Condition;
    use crate::infrastructure::cache::{InMemoryStore, StoreConfig};

    #[derive(Debug)]
    struct Never;

    #[tokio::test]
    async fn test_open_default_settings() {
        let cache = QueryCache::open(&CacheSettings::default()).unwrap();
        let descriptor = ReadDescriptor::new().with("threadId", Condition::eq(7));

        let posts: Vec<String> = cache
            .fetch("posts", &descriptor, &QueryOptions::new(), |_, _| async {
                Ok::<_, Never>(vec!["first".to_string()])
            })
            .await
            .unwrap();

        assert_eq!(posts, vec!["first".to_string()]);
        assert_eq!(cache.store().len().await.unwrap(), 1);
        assert_eq!(cache.invalidate_namespace("posts").await, 1);

        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_settings() {
        let settings =
            CacheSettings::default().with_store(StoreConfig::in_memory().with_max_size(0));

        assert!(matches!(
            QueryCache::open(&settings),
            Err(DomainError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_with_store_shares_store() {
        let store = Arc::new(InMemoryStore::new());
        let cache = QueryCache::with_store(store.clone(), QueryCacheConfig::default());

        let _: u32 = cache
            .fetch("users", &ReadDescriptor::new(), &QueryOptions::new(), |_, _| async {
                Ok::<_, Never>(3)
            })
            .await
            .unwrap();

        let key = cache
            .derive_key("users", &ReadDescriptor::new(), &QueryOptions::new())
            .unwrap();
        assert_eq!(key.as_str(), "users:{}:{}");
        assert!(store.get(key.as_str()).await.unwrap().is_some());
    }
}
