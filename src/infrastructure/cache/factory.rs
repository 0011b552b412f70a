//! Cache store factory for runtime selection

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use validator::Validate;

use crate::domain::cache::CacheStore;
use crate::domain::DomainError;

use super::in_memory::{InMemoryStore, InMemoryStoreConfig};
use super::redis::{RedisStore, RedisStoreConfig};

/// Supported store types
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-process bounded map
    #[default]
    InMemory,
    /// Redis
    Redis,
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreType::InMemory => write!(f, "in_memory"),
            StoreType::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for StoreType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(StoreType::InMemory),
            "redis" => Ok(StoreType::Redis),
            _ => Err(DomainError::configuration(format!(
                "Unknown store type: {}. Valid types: in_memory, redis",
                s
            ))),
        }
    }
}

/// Configuration for the store factory
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate)]
#[serde(default)]
pub struct StoreConfig {
    /// Type of store to create
    pub store_type: StoreType,
    #[validate(nested)]
    pub in_memory: InMemoryStoreConfig,
    #[validate(nested)]
    pub redis: RedisStoreConfig,
}

impl StoreConfig {
    /// Creates a configuration for the in-process store
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates a configuration for a Redis store
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            store_type: StoreType::Redis,
            redis: RedisStoreConfig::new(url),
            ..Default::default()
        }
    }

    /// Sets the default TTL on both backends
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.in_memory = self.in_memory.with_default_ttl(ttl);
        self.redis = self.redis.with_default_ttl(ttl);
        self
    }

    /// Sets the maximum number of entries (in-memory only)
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.in_memory = self.in_memory.with_max_size(max_size);
        self
    }

    /// Sets the Redis key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.redis = self.redis.with_key_prefix(prefix);
        self
    }

    /// Creates config from environment variables
    pub fn from_env() -> Result<Self, DomainError> {
        let store_type = std::env::var("CACHE_STORE_TYPE")
            .unwrap_or_else(|_| "in_memory".to_string())
            .parse()?;

        let mut config = Self {
            store_type,
            ..Default::default()
        };

        if let Ok(url) = std::env::var("REDIS_URL") {
            config.redis.url = url;
        }

        config.redis.key_prefix = std::env::var("CACHE_KEY_PREFIX").ok();

        if let Some(ttl) = env_number::<u64>("CACHE_DEFAULT_TTL_SECS") {
            config = config.with_default_ttl(Duration::from_secs(ttl));
        }

        if let Some(max_size) = env_number::<usize>("CACHE_MAX_SIZE") {
            config.in_memory.max_size = max_size;
        }

        if let Some(interval) = env_number::<u64>("CACHE_CLEANUP_INTERVAL_MS") {
            config.in_memory.cleanup_interval_ms = interval;
        }

        Ok(config)
    }

    /// Checks value ranges before a store is built
    pub fn ensure_valid(&self) -> Result<(), DomainError> {
        self.validate()
            .map_err(|e| DomainError::validation(format!("Invalid cache store config: {}", e)))
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Factory for creating cache stores
#[derive(Debug, Default)]
pub struct CacheStoreFactory;

impl CacheStoreFactory {
    /// Creates a new store factory
    pub fn new() -> Self {
        Self
    }

    /// Creates a store based on configuration
    ///
    /// The in-process store is opened with its background sweep running, so
    /// this must be called from within a tokio runtime.
    pub fn create(&self, config: &StoreConfig) -> Result<Arc<dyn CacheStore>, DomainError> {
        config.ensure_valid()?;

        tracing::info!(store_type = %config.store_type, "Creating cache store");

        match config.store_type {
            StoreType::InMemory => Ok(Arc::new(InMemoryStore::open(config.in_memory.clone()))),
            StoreType::Redis => Ok(Arc::new(RedisStore::new(config.redis.clone())?)),
        }
    }

    /// Creates an in-process store with the given configuration, sweep running
    pub fn create_in_memory(&self, config: InMemoryStoreConfig) -> Arc<dyn CacheStore> {
        Arc::new(InMemoryStore::open(config))
    }

    /// Creates a Redis store
    pub fn create_redis(&self, config: RedisStoreConfig) -> Result<Arc<dyn CacheStore>, DomainError> {
        Ok(Arc::new(RedisStore::new(config)?))
    }
}
