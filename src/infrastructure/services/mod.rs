//! Infrastructure services

mod invalidation_service;
mod query_cache;
mod query_cache_service;

pub use invalidation_service::InvalidationService;
pub use query_cache::QueryCache;
pub use query_cache_service::{QueryCacheConfig, QueryCacheService};
