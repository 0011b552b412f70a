//! Prometheus metrics for the query cache

use std::sync::Arc;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use super::config::MetricsConfig;

/// Prometheus metrics handle for rendering the exposition text
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Get the metrics in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Initialize Prometheus metrics
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::debug!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("query_cache_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

            tracing::info!("Prometheus metrics initialized");

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

/// Record a cache lookup for a namespace
pub fn record_cache_lookup(namespace: &str, hit: bool) {
    let labels = [
        ("namespace", namespace.to_string()),
        ("result", if hit { "hit" } else { "miss" }.to_string()),
    ];

    counter!("query_cache_lookups_total", &labels).increment(1);
}

/// Record a store operation that failed and was bypassed
pub fn record_store_error(operation: &'static str) {
    counter!("query_cache_store_errors_total", "operation" => operation).increment(1);
}

/// Record a capacity eviction in the in-process store
pub fn record_eviction() {
    counter!("query_cache_evictions_total").increment(1);
}

/// Record entries removed by a namespace invalidation
pub fn record_invalidation(namespace: &str, removed: usize) {
    counter!("query_cache_invalidated_entries_total", "namespace" => namespace.to_string())
        .increment(removed as u64);
}
