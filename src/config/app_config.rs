use serde::Deserialize;
use validator::Validate;

use crate::domain::query::NormalizerConfig;
use crate::domain::DomainError;
use crate::infrastructure::cache::{InMemoryStoreConfig, RedisStoreConfig, StoreConfig, StoreType};
use crate::infrastructure::observability::ObservabilityConfig;
use crate::infrastructure::services::QueryCacheConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub cache: CacheSettings,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Query cache settings: store selection plus normalization rules
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub store_type: StoreType,
    #[validate(nested)]
    pub in_memory: InMemoryStoreConfig,
    #[validate(nested)]
    pub redis: RedisStoreConfig,
    pub normalizer: NormalizerConfig,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            store_type: StoreType::default(),
            in_memory: InMemoryStoreConfig::default(),
            redis: RedisStoreConfig::default(),
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl CacheSettings {
    /// Replaces the store section, keeping normalization settings
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store_type = store.store_type;
        self.in_memory = store.in_memory;
        self.redis = store.redis;
        self
    }

    pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            store_type: self.store_type.clone(),
            in_memory: self.in_memory.clone(),
            redis: self.redis.clone(),
        }
    }

    pub fn service_config(&self) -> QueryCacheConfig {
        QueryCacheConfig {
            enabled: self.enabled,
            normalizer: self.normalizer.clone(),
        }
    }

    pub fn ensure_valid(&self) -> Result<(), DomainError> {
        self.validate()
            .map_err(|e| DomainError::validation(format!("Invalid cache settings: {}", e)))
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
