use prometheus::{IntCounterVec, IntGauge, Opts, Registry};
use std::sync::OnceLock;

use crate::services::migrator::MigrationOutcome;

static METRICS: OnceLock<MigrationMetricsInner> = OnceLock::new();

struct MigrationMetricsInner {
    runs: IntCounterVec,
    records: IntCounterVec,
    in_flight: IntGauge,
}

impl MigrationMetricsInner {
    fn new() -> Self {
        Self {
            runs: IntCounterVec::new(
                Opts::new(
                    "profile_image_migrations_total",
                    "Finished dependent record migrations by outcome",
                ),
                &["outcome"],
            )
            .expect("valid metric definition"),
            records: IntCounterVec::new(
                Opts::new(
                    "profile_image_migration_records_total",
                    "Dependent records processed by result",
                ),
                &["result"],
            )
            .expect("valid metric definition"),
            in_flight: IntGauge::with_opts(Opts::new(
                "profile_image_migrations_in_flight",
                "Dependent record migrations currently running",
            ))
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.runs.clone()))?;
        registry.register(Box::new(self.records.clone()))?;
        registry.register(Box::new(self.in_flight.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static MigrationMetricsInner {
    METRICS.get_or_init(MigrationMetricsInner::new)
}

/// Migration metrics wrapper
#[derive(Clone, Default)]
pub struct MigrationMetrics;

impl MigrationMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_outcome(&self, outcome: &MigrationOutcome) {
        get_metrics()
            .runs
            .with_label_values(&[outcome.label()])
            .inc();
    }

    /// `result` is one of "migrated", "unchanged" or "failed"
    pub fn record_record(&self, result: &str) {
        get_metrics().records.with_label_values(&[result]).inc();
    }

    pub fn run_started(&self) {
        get_metrics().in_flight.inc();
    }

    pub fn run_finished(&self) {
        get_metrics().in_flight.dec();
    }
}
