//! Domain layer - Read descriptors, cache keys and the store contract

pub mod cache;
pub mod error;
pub mod query;

pub use cache::{CacheKey, CacheKeyBuilder, CacheStore};
pub use error::{DomainError, FetchError};
pub use query::{NormalizedOptions, QueryNormalizer, QueryOptions, ReadDescriptor};
