//! Query result caching service

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::cache::{CacheKey, CacheKeyBuilder, CacheStore};
use crate::domain::query::{
    NormalizedOptions, NormalizerConfig, QueryNormalizer, QueryOptions, ReadDescriptor,
};
use crate::domain::{DomainError, FetchError};
use crate::infrastructure::observability::{record_cache_lookup, record_store_error};

/// Configuration for query result caching
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueryCacheConfig {
    /// Whether caching is enabled; when off every fetch runs the executor
    pub enabled: bool,
    pub normalizer: NormalizerConfig,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl QueryCacheConfig {
    pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Disables caching
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Serves read results from the cache store, running the executor on a miss
///
/// Keys are derived from the raw descriptor; the executor only ever sees the
/// normalized form. Concurrent misses on the same key each run the executor
/// and the last write wins.
#[derive(Debug, Clone)]
pub struct QueryCacheService {
    store: Arc<dyn CacheStore>,
    normalizer: QueryNormalizer,
    key_builder: CacheKeyBuilder,
    enabled: bool,
}

impl QueryCacheService {
    /// Creates a new query cache service
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_config(store, QueryCacheConfig::default())
    }

    /// Creates a new query cache service with custom config
    pub fn with_config(store: Arc<dyn CacheStore>, config: QueryCacheConfig) -> Self {
        Self {
            store,
            normalizer: QueryNormalizer::with_config(config.normalizer),
            key_builder: CacheKeyBuilder::new(),
            enabled: config.enabled,
        }
    }

    pub fn normalizer(&self) -> &QueryNormalizer {
        &self.normalizer
    }

    /// Derives the cache key for a raw read
    pub fn derive_key(
        &self,
        namespace: &str,
        descriptor: &ReadDescriptor,
        options: &QueryOptions,
    ) -> Result<CacheKey, DomainError> {
        self.key_builder.derive(namespace, descriptor, options)
    }

    /// Returns the cached result for a read, or runs `executor` and caches its result
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
        if !self.enabled {
            let normalized = self.normalizer.normalize(descriptor, options);
            return executor(normalized.filter, normalized.options)
                .await
                .map_err(FetchError::Executor);
        }

        let key = self
            .derive_key(namespace, descriptor, options)
            .map_err(FetchError::Key)?;

        if let Some(value) = self.lookup::<T>(namespace, &key).await {
            return Ok(value);
        }

        let normalized = self.normalizer.normalize(descriptor, options);
        let result = executor(normalized.filter, normalized.options)
            .await
            .map_err(FetchError::Executor)?;

        self.store_result(&key, &result, options.ttl.map(Duration::from_secs))
            .await;

        Ok(result)
    }

    async fn lookup<T: DeserializeOwned>(&self, namespace: &str, key: &CacheKey) -> Option<T> {
        let cached = match self.store.get(key.as_str()).await {
            Ok(cached) => cached,
            Err(e) => {
                record_store_error("get");
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        };

        let Some(data) = cached else {
            record_cache_lookup(namespace, false);
            tracing::debug!(namespace, key = %key, "Cache miss");
            return None;
        };

        match serde_json::from_slice(&data) {
            Ok(value) => {
                record_cache_lookup(namespace, true);
                tracing::debug!(namespace, key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                record_cache_lookup(namespace, false);
                tracing::warn!(key = %key, error = %e, "Undecodable cache entry, treating as miss");
                None
            }
        }
    }

    async fn store_result<T: Serialize>(&self, key: &CacheKey, result: &T, ttl: Option<Duration>) {
        let data = match serde_json::to_vec(result) {
            Ok(data) => Bytes::from(data),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Result not encodable, skipping cache write");
                return;
            }
        };

        if let Err(e) = self.store.set(key.as_str(), data, ttl).await {
            record_store_error("set");
            tracing::warn!(key = %key, error = %e, "Cache write failed, result not cached");
        }
    }
}
