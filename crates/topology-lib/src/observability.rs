//! Observability infrastructure for topology collection
//!
//! Provides:
//! - Prometheus metrics (run duration, emitted graph size, dropped relations, collector errors)
//! - Structured JSON logging of the run lifecycle with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Buckets for a full collection run (in seconds)
const RUN_DURATION_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<TopologyMetricsInner> = OnceLock::new();

struct TopologyMetricsInner {
    run_duration_seconds: Histogram,
    runs_total: IntCounter,
    components_emitted: IntCounter,
    relations_emitted: IntCounter,
    deferred_relations_dropped: IntCounter,
    collector_errors: IntCounterVec,
    last_successful_run_timestamp: IntGauge,
}

impl TopologyMetricsInner {
    fn new() -> Self {
        Self {
            run_duration_seconds: register_histogram!(
                "topology_run_duration_seconds",
                "Wall time of one topology collection run",
                RUN_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register run_duration_seconds"),

            runs_total: register_int_counter!(
                "topology_runs_total",
                "Number of topology collection runs started"
            )
            .expect("Failed to register runs_total"),

            components_emitted: register_int_counter!(
                "topology_components_emitted_total",
                "Components written to the component stream"
            )
            .expect("Failed to register components_emitted"),

            relations_emitted: register_int_counter!(
                "topology_relations_emitted_total",
                "Relations written to the relation stream"
            )
            .expect("Failed to register relations_emitted"),

            deferred_relations_dropped: register_int_counter!(
                "topology_deferred_relations_dropped_total",
                "Deferred relations dropped because an endpoint never appeared"
            )
            .expect("Failed to register deferred_relations_dropped"),

            collector_errors: register_int_counter_vec!(
                "topology_collector_errors_total",
                "Collector runs that ended in an error",
                &["collector"]
            )
            .expect("Failed to register collector_errors"),

            last_successful_run_timestamp: register_int_gauge!(
                "topology_last_successful_run_timestamp_seconds",
                "Unix time of the last run that finished within its timeout"
            )
            .expect("Failed to register last_successful_run_timestamp"),
        }
    }
}

/// Lightweight handle to the global topology metrics.
///
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct TopologyMetrics {
    _private: (),
}

impl Default for TopologyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(TopologyMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &TopologyMetricsInner {
        GLOBAL_METRICS.get_or_init(TopologyMetricsInner::new)
    }

    pub fn inc_runs(&self) {
        self.inner().runs_total.inc();
    }

    pub fn observe_run_duration(&self, duration_secs: f64) {
        self.inner().run_duration_seconds.observe(duration_secs);
    }

    pub fn add_components(&self, count: u64) {
        self.inner().components_emitted.inc_by(count);
    }

    pub fn add_relations(&self, count: u64) {
        self.inner().relations_emitted.inc_by(count);
    }

    pub fn add_dropped_relations(&self, count: u64) {
        self.inner().deferred_relations_dropped.inc_by(count);
    }

    pub fn inc_collector_errors(&self, collector: &str) {
        self.inner()
            .collector_errors
            .with_label_values(&[collector])
            .inc();
    }

    pub fn set_last_successful_run(&self, unix_secs: i64) {
        self.inner().last_successful_run_timestamp.set(unix_secs);
    }

    pub fn components_emitted(&self) -> u64 {
        self.inner().components_emitted.get()
    }
}

/// Structured logger for run lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    cluster_name: String,
}

impl StructuredLogger {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, cluster_type: &str) {
        info!(
            event = "agent_started",
            cluster = %self.cluster_name,
            cluster_type = %cluster_type,
            agent_version = %version,
            "Topology agent started"
        );
    }

    pub fn log_run_started(&self, run_id: u64) {
        info!(
            event = "run_started",
            cluster = %self.cluster_name,
            run_id = run_id,
            "Topology collection started"
        );
    }

    pub fn log_run_completed(
        &self,
        run_id: u64,
        components: usize,
        relations: usize,
        dropped_relations: usize,
        failed_collectors: usize,
        duration_ms: u128,
    ) {
        if failed_collectors > 0 {
            warn!(
                event = "run_completed",
                cluster = %self.cluster_name,
                run_id = run_id,
                components = components,
                relations = relations,
                dropped_relations = dropped_relations,
                failed_collectors = failed_collectors,
                duration_ms = duration_ms as u64,
                "Topology collection completed with failures"
            );
        } else {
            info!(
                event = "run_completed",
                cluster = %self.cluster_name,
                run_id = run_id,
                components = components,
                relations = relations,
                dropped_relations = dropped_relations,
                duration_ms = duration_ms as u64,
                "Topology collection completed"
            );
        }
    }

    pub fn log_collector_failed(&self, collector: &str, error: &str) {
        warn!(
            event = "collector_failed",
            cluster = %self.cluster_name,
            collector = %collector,
            error = %error,
            "Collector failed"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            cluster = %self.cluster_name,
            reason = %reason,
            "Topology agent shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_metrics_share_global_registry() {
        let metrics = TopologyMetrics::new();
        let clone = metrics.clone();

        let before = metrics.components_emitted();
        metrics.add_components(3);
        clone.add_components(2);
        assert!(metrics.components_emitted() >= before + 5);

        metrics.inc_runs();
        metrics.observe_run_duration(0.4);
        metrics.add_relations(7);
        metrics.add_dropped_relations(1);
        metrics.inc_collector_errors("secret-collector");
        metrics.set_last_successful_run(1_700_000_000);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-cluster");
        assert_eq!(logger.cluster_name, "test-cluster");
    }
}
