//! Forum query cache
//!
//! Read-through caching for database reads of a forum backend:
//! - Deterministic cache keys from a namespace, filter and options
//! - Query normalization (disjunction collapse, date coercion, sort and
//!   pagination canonicalization)
//! - Pluggable stores: bounded in-process LRU with TTL, or Redis
//! - Namespace-wide invalidation after writes

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{AppConfig, CacheSettings};
pub use domain::{
    CacheKey, CacheKeyBuilder, CacheStore, DomainError, FetchError, NormalizedOptions,
    QueryNormalizer, QueryOptions, ReadDescriptor,
};
pub use infrastructure::cache::{CacheStoreFactory, InMemoryStore, RedisStore, StoreConfig};
pub use infrastructure::services::{InvalidationService, QueryCache, QueryCacheService};
