//! Observability infrastructure for the collector
//!
//! Provides:
//! - Prometheus metrics (sampling passes, record rows, drift events, backend errors)
//! - Structured JSON logging of monitor events with tracing

use crate::models::ResourceSnapshot;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter,
    IntGauge, TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for a sampling pass (in seconds)
///
/// A pass issues one Zipkin query per service, each bounded by a 7s timeout.
const SAMPLING_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct MonitorMetricsInner {
    sampling_latency_seconds: Histogram,
    sampling_passes: IntCounter,
    tag_sets_collected: IntCounter,
    sequence_length: IntGauge,
    records_persisted: IntCounter,
    drift_events: IntCounter,
    trace_fetch_errors: IntCounter,
    cluster_errors: IntCounter,
    record_errors: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            sampling_latency_seconds: register_histogram!(
                "fps_collector_sampling_latency_seconds",
                "Time spent on one poll-and-collect pass over all services",
                SAMPLING_BUCKETS.to_vec()
            )
            .expect("Failed to register sampling_latency_seconds"),

            sampling_passes: register_int_counter!(
                "fps_collector_sampling_passes_total",
                "Total number of sampling passes"
            )
            .expect("Failed to register sampling_passes"),

            tag_sets_collected: register_int_counter!(
                "fps_collector_tag_sets_collected_total",
                "Total number of span tag sets collected inside sampling windows"
            )
            .expect("Failed to register tag_sets_collected"),

            sequence_length: register_int_gauge!(
                "fps_collector_sequence_length",
                "Length of the most recent aggregated sequence"
            )
            .expect("Failed to register sequence_length"),

            records_persisted: register_int_counter!(
                "fps_collector_records_persisted_total",
                "Total number of record rows appended"
            )
            .expect("Failed to register records_persisted"),

            drift_events: register_int_counter!(
                "fps_collector_drift_events_total",
                "Total number of resource allocation changes detected"
            )
            .expect("Failed to register drift_events"),

            trace_fetch_errors: register_int_counter!(
                "fps_collector_trace_fetch_errors_total",
                "Total number of failed trace backend queries"
            )
            .expect("Failed to register trace_fetch_errors"),

            cluster_errors: register_int_counter!(
                "fps_collector_cluster_errors_total",
                "Total number of failed Kubernetes API reads"
            )
            .expect("Failed to register cluster_errors"),

            record_errors: register_int_counter!(
                "fps_collector_record_errors_total",
                "Total number of failed record appends"
            )
            .expect("Failed to register record_errors"),
        }
    }
}

/// Collector metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a finished sampling pass
    pub fn observe_sampling_pass(&self, duration_secs: f64, tag_sets: usize, sequence_len: usize) {
        let inner = self.inner();
        inner.sampling_latency_seconds.observe(duration_secs);
        inner.sampling_passes.inc();
        inner.tag_sets_collected.inc_by(tag_sets as u64);
        inner.sequence_length.set(sequence_len as i64);
    }

    pub fn inc_records_persisted(&self) {
        self.inner().records_persisted.inc();
    }

    pub fn inc_drift_events(&self) {
        self.inner().drift_events.inc();
    }

    pub fn inc_trace_fetch_errors(&self) {
        self.inner().trace_fetch_errors.inc();
    }

    pub fn inc_cluster_errors(&self) {
        self.inner().cluster_errors.inc();
    }

    pub fn inc_record_errors(&self) {
        self.inner().record_errors.inc();
    }

    /// Encode every registered metric in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for monitor events
///
/// Provides consistent JSON-formatted logging for record rows, drift and
/// lifecycle events of one monitored deployment.
#[derive(Clone)]
pub struct StructuredLogger {
    deployment: String,
}

impl StructuredLogger {
    pub fn new(deployment: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
        }
    }

    /// Log collector startup
    pub fn log_startup(&self, version: &str, namespace: &str, services: &[String]) {
        info!(
            event = "collector_started",
            deployment = %self.deployment,
            collector_version = %version,
            namespace = %namespace,
            services = ?services,
            "FPS collector started"
        );
    }

    /// Log collector shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "collector_shutdown",
            deployment = %self.deployment,
            reason = %reason,
            "FPS collector shutting down"
        );
    }

    /// Log a resource snapshot read at a checkpoint
    pub fn log_snapshot(&self, pod: &str, snapshot: &ResourceSnapshot) {
        info!(
            event = "resource_snapshot",
            deployment = %self.deployment,
            pod = %pod,
            cpu_limit = ?snapshot.cpu_limit,
            memory_limit = ?snapshot.memory_limit,
            replicas = ?snapshot.replica_count,
            "Read workload resources"
        );
    }

    /// Log an appended record row
    pub fn log_record_persisted(&self, path: &Path, values: usize, snapshot: &ResourceSnapshot) {
        info!(
            event = "record_persisted",
            deployment = %self.deployment,
            path = %path.display(),
            values = values,
            cpu_limit = ?snapshot.cpu_limit,
            memory_limit = ?snapshot.memory_limit,
            replicas = ?snapshot.replica_count,
            "Record row saved"
        );
    }

    /// Log a row that was not written because the snapshot is incomplete
    pub fn log_record_skipped(&self, snapshot: &ResourceSnapshot) {
        warn!(
            event = "record_skipped",
            deployment = %self.deployment,
            cpu_limit = ?snapshot.cpu_limit,
            memory_limit = ?snapshot.memory_limit,
            replicas = ?snapshot.replica_count,
            deployment_name = ?snapshot.deployment_name,
            "Resource snapshot incomplete, no record row written"
        );
    }

    /// Log a change in resource allocation
    pub fn log_drift(&self, baseline: &ResourceSnapshot, current: &ResourceSnapshot) {
        info!(
            event = "drift_detected",
            deployment = %self.deployment,
            old_cpu_limit = ?baseline.cpu_limit,
            new_cpu_limit = ?current.cpu_limit,
            old_memory_limit = ?baseline.memory_limit,
            new_memory_limit = ?current.memory_limit,
            old_replicas = ?baseline.replica_count,
            new_replicas = ?current.replica_count,
            "Resource allocation changed"
        );
    }

    /// Log the end of the monitor loop
    pub fn log_terminated(&self, reason: &str) {
        error!(
            event = "monitor_terminated",
            deployment = %self.deployment,
            reason = %reason,
            "Monitoring stopped"
        );
    }
}
