//! Cache metrics for observability

use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: IntCounterVec,
    misses: IntCounterVec,
    evictions: IntCounterVec,
    entries: IntGaugeVec,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: IntCounterVec::new(
                Opts::new("profile_image_cache_hits_total", "Total image cache hits"),
                &["cache"],
            )
            .expect("valid metric definition"),
            misses: IntCounterVec::new(
                Opts::new(
                    "profile_image_cache_misses_total",
                    "Total image cache misses",
                ),
                &["cache"],
            )
            .expect("valid metric definition"),
            evictions: IntCounterVec::new(
                Opts::new(
                    "profile_image_cache_evictions_total",
                    "Total entries evicted because the cache was full",
                ),
                &["cache"],
            )
            .expect("valid metric definition"),
            entries: IntGaugeVec::new(
                Opts::new(
                    "profile_image_cache_entries",
                    "Number of entries currently held by the cache",
                ),
                &["cache"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.evictions.clone()))?;
        registry.register(Box::new(self.entries.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Cache metrics wrapper, labelled with the owning cache's name
#[derive(Debug, Clone)]
pub struct CacheMetrics {
    cache: String,
}

impl CacheMetrics {
    pub fn new(cache: impl Into<String>) -> Self {
        Self {
            cache: cache.into(),
        }
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self) {
        get_metrics().hits.with_label_values(&[&self.cache]).inc();
    }

    pub fn record_miss(&self) {
        get_metrics().misses.with_label_values(&[&self.cache]).inc();
    }

    pub fn record_eviction(&self) {
        get_metrics()
            .evictions
            .with_label_values(&[&self.cache])
            .inc();
    }

    pub fn set_entries(&self, len: usize) {
        get_metrics()
            .entries
            .with_label_values(&[&self.cache])
            .set(len as i64);
    }

    /// Last published entry count
    pub fn entries(&self) -> i64 {
        get_metrics()
            .entries
            .with_label_values(&[&self.cache])
            .get()
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new("default")
    }
}
