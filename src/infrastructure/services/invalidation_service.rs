//! Namespace invalidation service

use std::sync::Arc;

use crate::domain::cache::{CacheKeyBuilder, CacheStore};
use crate::infrastructure::observability::record_invalidation;

/// Drops every cached result of a namespace after a write to it
#[derive(Debug, Clone)]
pub struct InvalidationService {
    store: Arc<dyn CacheStore>,
}

impl InvalidationService {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Removes all entries in `namespace`, returning how many were removed
    ///
    /// Store failures are logged and reported as zero removals; writers are
    /// never failed by the cache tier.
    pub async fn invalidate_namespace(&self, namespace: &str) -> usize {
        let prefix = CacheKeyBuilder::namespace_prefix(namespace);

        match self.store.delete_by_prefix(&prefix).await {
            Ok(removed) => {
                record_invalidation(namespace, removed);
                tracing::debug!(namespace, removed, "Invalidated namespace");
                removed
            }
            Err(e) => {
                tracing::warn!(namespace, error = %e, "Namespace invalidation failed");
                0
            }
        }
    }
}
