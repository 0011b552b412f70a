//! Observability infrastructure - Metrics

mod config;
mod metrics;

pub use config::{MetricsConfig, ObservabilityConfig};
pub use metrics::{
    init_metrics, record_cache_lookup, record_eviction, record_invalidation, record_store_error,
    PrometheusMetrics,
};
