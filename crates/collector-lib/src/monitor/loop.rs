//! Monitor state machine
//!
//! Implements the sample → snapshot → persist → watch cycle as explicit
//! states. Each call to [`MonitorLoop::step`] performs one transition; the
//! only suspension points are the watch and settle sleeps and the calls to
//! the trace backend and the cluster API.

use crate::cluster::ClusterReader;
use crate::health::{Component, HealthRegistry};
use crate::models::{AggregatedSequence, ResourceSnapshot};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::record::{RecordRow, RecordSink};
use crate::sampling::{Aggregator, Observation, SamplingContext, DEFAULT_WINDOW_DURATION};
use crate::traces::TraceSource;
use anyhow::Result;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Configuration for the monitor loop
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between resource checks (default: 60 seconds)
    pub watch_interval: Duration,
    /// Wait after a detected change before re-sampling (default: 15 minutes)
    pub settle_interval: Duration,
    /// How long a sampling window stays open after onset (default: 2 seconds)
    pub window_duration: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watch_interval: Duration::from_secs(60),
            settle_interval: Duration::from_secs(15 * 60),
            window_duration: DEFAULT_WINDOW_DURATION,
        }
    }
}

/// The workload whose resources are correlated with the sampled tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorTarget {
    pub namespace: String,
    /// Substring matched against pod names
    pub pod_pattern: String,
    pub deployment: String,
}

/// Why the monitor loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// No pod name contains the configured pattern
    PodNotFound { pattern: String },
    /// Listing pods failed
    PodLookupFailed(String),
    /// The first snapshot lacked cpu, memory, replicas or deployment name
    IncompleteSnapshot,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::PodNotFound { pattern } => {
                write!(f, "no pod matching '{}' found", pattern)
            }
            TerminationReason::PodLookupFailed(e) => write!(f, "pod lookup failed: {}", e),
            TerminationReason::IncompleteSnapshot => {
                write!(f, "resource snapshot is missing required fields")
            }
        }
    }
}

/// States of the monitor loop
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorState {
    /// Start of a full cycle: sample every service once
    Sampling,
    /// Sequence ready, resource snapshot not yet read
    Snapshotting { sequence: AggregatedSequence },
    /// Sequence and snapshot ready to be written
    ///
    /// `previous` is the last persisted snapshot. It stays the baseline if
    /// no row can be written for `snapshot`.
    Persisted {
        sequence: AggregatedSequence,
        snapshot: ResourceSnapshot,
        previous: Option<ResourceSnapshot>,
    },
    /// Waiting for the allocation to move away from the last persisted
    /// snapshot
    Watching { baseline: ResourceSnapshot },
    /// Allocation changed from `baseline` to `snapshot`; waiting for the
    /// rollout to settle
    Drifted {
        snapshot: ResourceSnapshot,
        baseline: ResourceSnapshot,
    },
    /// Settled; sample again and persist against `snapshot`
    Resampling {
        snapshot: ResourceSnapshot,
        baseline: ResourceSnapshot,
    },
    /// The loop has ended
    Terminated(TerminationReason),
}

impl MonitorState {
    pub fn name(&self) -> &'static str {
        match self {
            MonitorState::Sampling => "sampling",
            MonitorState::Snapshotting { .. } => "snapshotting",
            MonitorState::Persisted { .. } => "persisted",
            MonitorState::Watching { .. } => "watching",
            MonitorState::Drifted { .. } => "drifted",
            MonitorState::Resampling { .. } => "resampling",
            MonitorState::Terminated(_) => "terminated",
        }
    }
}

/// Monitor loop driving sampling, persistence and drift detection
pub struct MonitorLoop {
    trace_source: Arc<dyn TraceSource>,
    cluster: Arc<dyn ClusterReader>,
    sink: Arc<dyn RecordSink>,
    target: MonitorTarget,
    config: MonitorConfig,
    /// Per-cycle window state, reset on every new cycle
    context: SamplingContext,
    aggregator: Aggregator,
    health: HealthRegistry,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl MonitorLoop {
    /// Create a new monitor loop
    pub fn new(
        trace_source: Arc<dyn TraceSource>,
        cluster: Arc<dyn ClusterReader>,
        sink: Arc<dyn RecordSink>,
        target: MonitorTarget,
        services: &[String],
        config: MonitorConfig,
        health: HealthRegistry,
    ) -> Self {
        let context = SamplingContext::new(services, config.window_duration);
        let logger = StructuredLogger::new(&target.deployment);

        Self {
            trace_source,
            cluster,
            sink,
            target,
            config,
            context,
            aggregator: Aggregator::new(),
            health,
            metrics: MonitorMetrics::new(),
            logger,
        }
    }

    pub fn context(&self) -> &SamplingContext {
        &self.context
    }

    /// Run until a terminal state is reached
    pub async fn run(mut self) -> TerminationReason {
        info!(
            namespace = %self.target.namespace,
            pod_pattern = %self.target.pod_pattern,
            deployment = %self.target.deployment,
            watch_interval_secs = self.config.watch_interval.as_secs(),
            settle_interval_secs = self.config.settle_interval.as_secs(),
            "Starting monitor loop"
        );

        let mut state = MonitorState::Sampling;
        loop {
            state = self.step(state).await;
            if let MonitorState::Terminated(reason) = state {
                self.logger.log_terminated(&reason.to_string());
                self.health.mark_stopped(reason.to_string()).await;
                return reason;
            }
        }
    }

    /// Perform one state transition
    pub async fn step(&mut self, state: MonitorState) -> MonitorState {
        debug!(state = state.name(), "Monitor step");

        match state {
            MonitorState::Sampling => {
                // The pod must exist before the first pass
                if let Err(reason) = self.resolve_pod().await {
                    return MonitorState::Terminated(reason);
                }
                self.context.reset();
                let sequence = self.sample_and_aggregate().await;
                MonitorState::Snapshotting { sequence }
            }
            MonitorState::Snapshotting { sequence } => {
                let snapshot = match self.read_snapshot().await {
                    Ok(snapshot) => snapshot,
                    Err(reason) => return MonitorState::Terminated(reason),
                };
                if !snapshot.is_complete() {
                    self.logger.log_record_skipped(&snapshot);
                    return MonitorState::Terminated(TerminationReason::IncompleteSnapshot);
                }
                MonitorState::Persisted {
                    sequence,
                    snapshot,
                    previous: None,
                }
            }
            MonitorState::Persisted {
                sequence,
                snapshot,
                previous,
            } => {
                let written = self.persist(sequence, &snapshot).await;
                let baseline = match previous {
                    Some(previous) if !written => previous,
                    _ => snapshot,
                };
                MonitorState::Watching { baseline }
            }
            MonitorState::Watching { baseline } => {
                sleep(self.config.watch_interval).await;
                debug!("Checking for resource changes");

                let mut current = match self.read_snapshot().await {
                    Ok(snapshot) => snapshot,
                    Err(reason) => return MonitorState::Terminated(reason),
                };

                if !current.drifted_from(&baseline) {
                    debug!("No resource changes detected");
                    return MonitorState::Watching { baseline };
                }

                if current.deployment_name.is_none() {
                    current.deployment_name = baseline.deployment_name.clone();
                }
                self.logger.log_drift(&baseline, &current);
                self.metrics.inc_drift_events();
                MonitorState::Drifted {
                    snapshot: current,
                    baseline,
                }
            }
            MonitorState::Drifted { snapshot, baseline } => {
                info!(
                    settle_secs = self.config.settle_interval.as_secs(),
                    "Waiting for rollout to settle before re-sampling"
                );
                sleep(self.config.settle_interval).await;
                MonitorState::Resampling { snapshot, baseline }
            }
            MonitorState::Resampling { snapshot, baseline } => {
                self.context.reset();
                let sequence = self.sample_and_aggregate().await;
                MonitorState::Persisted {
                    sequence,
                    snapshot,
                    previous: Some(baseline),
                }
            }
            terminated @ MonitorState::Terminated(_) => terminated,
        }
    }

    /// One poll-and-collect pass over every service, then aggregation
    ///
    /// Each service is queried once. Windows still open when the pass ends
    /// are closed, so the sequence only holds spans seen in this pass.
    pub async fn sample_and_aggregate(&mut self) -> AggregatedSequence {
        let start = Instant::now();
        let services: Vec<String> = self.context.services().map(str::to_string).collect();
        let mut failures = Vec::new();

        for service in &services {
            let traces = match self.trace_source.fetch(service).await {
                Ok(traces) => traces,
                Err(e) => {
                    warn!(service = %service, error = %e, "Failed to fetch traces");
                    self.metrics.inc_trace_fetch_errors();
                    failures.push(format!("{}: {}", service, e));
                    continue;
                }
            };

            let Some(window) = self.context.window_mut(service) else {
                continue;
            };

            let mut collected = 0usize;
            for tags in traces.iter().flatten().filter_map(|span| span.tags.as_ref()) {
                if window.observe(tags, Instant::now()) == Observation::Collected {
                    collected += 1;
                }
            }

            debug!(
                service = %service,
                traces = traces.len(),
                collected = collected,
                "Sampled service"
            );
        }

        self.health
            .report_pass(Component::TraceSource, &failures)
            .await;
        self.context.close_all();
        let sequence = self.aggregator.aggregate(&self.context);

        let elapsed = start.elapsed();
        self.metrics.observe_sampling_pass(
            elapsed.as_secs_f64(),
            self.context.collected_count(),
            sequence.len(),
        );
        info!(
            tag_sets = self.context.collected_count(),
            values = sequence.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Sampling pass complete"
        );

        sequence
    }

    /// Name of the first pod matching the target pattern
    async fn resolve_pod(&self) -> std::result::Result<String, TerminationReason> {
        let target = &self.target;

        match self
            .cluster
            .find_pod(&target.namespace, &target.pod_pattern)
            .await
        {
            Ok(Some(pod)) => Ok(pod),
            Ok(None) => {
                warn!(
                    namespace = %target.namespace,
                    pattern = %target.pod_pattern,
                    "Pod not found"
                );
                Err(TerminationReason::PodNotFound {
                    pattern: target.pod_pattern.clone(),
                })
            }
            Err(e) => {
                warn!(namespace = %target.namespace, error = %e, "Failed to look up pod");
                self.metrics.inc_cluster_errors();
                self.health.record_failure(Component::Cluster, e.to_string()).await;
                Err(TerminationReason::PodLookupFailed(e.to_string()))
            }
        }
    }

    /// Resolve the target pod and read its current resource snapshot
    ///
    /// Pod resolution failures end the loop. Limit and replica read failures
    /// are logged and leave the corresponding fields absent.
    async fn read_snapshot(&self) -> std::result::Result<ResourceSnapshot, TerminationReason> {
        let target = &self.target;
        let pod = self.resolve_pod().await?;

        let limits = self.cluster.pod_limits(&target.namespace, &pod).await;
        let scale = self
            .cluster
            .deployment_scale(&target.namespace, &target.deployment)
            .await;

        match (&limits, &scale) {
            (Err(e), _) | (_, Err(e)) => {
                self.health.record_failure(Component::Cluster, e.to_string()).await;
            }
            _ => self.health.record_success(Component::Cluster).await,
        }

        let limits = limits.unwrap_or_else(|e| {
            warn!(pod = %pod, error = %e, "Failed to read pod limits");
            self.metrics.inc_cluster_errors();
            Default::default()
        });
        let scale = scale.unwrap_or_else(|e| {
            warn!(deployment = %target.deployment, error = %e, "Failed to read deployment");
            self.metrics.inc_cluster_errors();
            Default::default()
        });

        let snapshot = ResourceSnapshot {
            cpu_limit: limits.cpu,
            memory_limit: limits.memory,
            replica_count: scale.replicas,
            deployment_name: scale.name,
        };
        self.logger.log_snapshot(&pod, &snapshot);

        Ok(snapshot)
    }

    /// Append the row for `sequence` and `snapshot`, if the snapshot allows one
    ///
    /// Returns whether a row was written.
    async fn persist(&self, sequence: AggregatedSequence, snapshot: &ResourceSnapshot) -> bool {
        let values = sequence.len();
        let Some(row) = RecordRow::new(sequence, snapshot) else {
            self.logger.log_record_skipped(snapshot);
            return false;
        };

        let outcome = self.sink.append(&row).await;
        self.health.report(Component::RecordSink, &outcome).await;

        match outcome {
            Ok(path) => {
                self.metrics.inc_records_persisted();
                self.logger.log_record_persisted(&path, values, snapshot);
                true
            }
            Err(e) => {
                warn!(deployment = %row.deployment, error = %e, "Failed to append record row");
                self.metrics.inc_record_errors();
                false
            }
        }
    }
}

/// Builder for creating the monitor loop
pub struct MonitorLoopBuilder {
    trace_source: Option<Arc<dyn TraceSource>>,
    cluster: Option<Arc<dyn ClusterReader>>,
    sink: Option<Arc<dyn RecordSink>>,
    target: Option<MonitorTarget>,
    services: Vec<String>,
    config: MonitorConfig,
    health: Option<HealthRegistry>,
}

impl MonitorLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            trace_source: None,
            cluster: None,
            sink: None,
            target: None,
            services: Vec::new(),
            config: MonitorConfig::default(),
            health: None,
        }
    }

    /// Set the trace source
    pub fn trace_source(mut self, trace_source: Arc<dyn TraceSource>) -> Self {
        self.trace_source = Some(trace_source);
        self
    }

    /// Set the cluster reader
    pub fn cluster(mut self, cluster: Arc<dyn ClusterReader>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Set the record sink
    pub fn sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the monitored workload
    pub fn target(mut self, target: MonitorTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the services to sample, in traversal order
    pub fn services(mut self, services: Vec<String>) -> Self {
        self.services = services;
        self
    }

    /// Replace the loop timing configuration
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the interval between resource checks
    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.config.watch_interval = interval;
        self
    }

    /// Set the settling period after a detected change
    pub fn settle_interval(mut self, interval: Duration) -> Self {
        self.config.settle_interval = interval;
        self
    }

    /// Set the sampling window duration
    pub fn window_duration(mut self, duration: Duration) -> Self {
        self.config.window_duration = duration;
        self
    }

    /// Set the health registry to report component health to
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Build the monitor loop
    pub fn build(self) -> Result<MonitorLoop> {
        let trace_source = self
            .trace_source
            .ok_or_else(|| anyhow::anyhow!("Trace source is required"))?;
        let cluster = self
            .cluster
            .ok_or_else(|| anyhow::anyhow!("Cluster reader is required"))?;
        let sink = self
            .sink
            .ok_or_else(|| anyhow::anyhow!("Record sink is required"))?;
        let target = self
            .target
            .ok_or_else(|| anyhow::anyhow!("Monitor target is required"))?;
        if self.services.iter().all(|s| s.trim().is_empty()) {
            anyhow::bail!("At least one service is required");
        }

        Ok(MonitorLoop::new(
            trace_source,
            cluster,
            sink,
            target,
            &self.services,
            self.config,
            self.health.unwrap_or_default(),
        ))
    }
}

impl Default for MonitorLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
