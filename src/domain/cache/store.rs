//! Cache store trait definition

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// Key/value tier holding encoded query results with a per-entry TTL
///
/// Values are opaque bytes; encoding is the caller's concern. A `None` TTL
/// means the store's configured default.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Gets a live value; expired or missing entries yield `None`
    async fn get(&self, key: &str) -> Result<Option<Bytes>, DomainError>;

    /// Stores a value, replacing any previous one
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), DomainError>;

    /// Deletes a value, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool, DomainError>;

    /// Deletes every key starting with `prefix`, returning how many were removed
    async fn delete_by_prefix(&self, prefix: &str) -> Result<usize, DomainError>;

    /// Approximate number of live entries
    async fn len(&self) -> Result<usize, DomainError>;

    /// Releases background resources; the store stays usable for plain reads and writes
    async fn close(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
