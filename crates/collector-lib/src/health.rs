//! Component health for the collector's liveness and readiness probes
//!
//! Every collaborator of the monitor loop is a [`Component`]. Failed calls to
//! a collaborator only degrade it, since the loop substitutes empty results
//! and carries on. The monitor component becomes unhealthy once the loop has
//! stopped, which is the only state that fails liveness.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Parts of the collector whose health is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Zipkin queries
    TraceSource,
    /// Kubernetes API reads
    Cluster,
    /// Record file appends
    RecordSink,
    /// The monitor loop itself
    Monitor,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::TraceSource,
        Component::Cluster,
        Component::RecordSink,
        Component::Monitor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::TraceSource => "trace_source",
            Component::Cluster => "cluster",
            Component::RecordSink => "record_sink",
            Component::Monitor => "monitor",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health status, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// The last call or pass failed; the loop keeps running on substitutes
    Degraded,
    /// The monitor loop has stopped
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

/// Latest health of one component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failed checks since the last success
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>, consecutive_failures: u32) -> Self {
        Self {
            status,
            message,
            consecutive_failures,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Body of `GET /healthz`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Worst status over all components
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

/// Body of `GET /readyz`
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared health state of the collector
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<Component, ComponentHealth>>>,
    ready: Arc<AtomicBool>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Create a registry with every component healthy and readiness unset
    pub fn new() -> Self {
        let components = Component::ALL
            .into_iter()
            .map(|c| (c, ComponentHealth::new(ComponentStatus::Healthy, None, 0)))
            .collect();

        Self {
            components: Arc::new(RwLock::new(components)),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record a successful call to `component`
    pub async fn record_success(&self, component: Component) {
        let mut components = self.components.write().await;
        components.insert(
            component,
            ComponentHealth::new(ComponentStatus::Healthy, None, 0),
        );
    }

    /// Record a failed call to `component`
    pub async fn record_failure(&self, component: Component, message: impl Into<String>) {
        let mut components = self.components.write().await;
        let failures = components
            .get(&component)
            .map_or(0, |health| health.consecutive_failures);
        components.insert(
            component,
            ComponentHealth::new(ComponentStatus::Degraded, Some(message.into()), failures + 1),
        );
    }

    /// Record the outcome of a single call to `component`
    pub async fn report<T, E: fmt::Display>(&self, component: Component, outcome: &Result<T, E>) {
        match outcome {
            Ok(_) => self.record_success(component).await,
            Err(e) => self.record_failure(component, e.to_string()).await,
        }
    }

    /// Record the outcome of a pass that called `component` several times
    ///
    /// The pass counts as one check: it fails if any call in it failed, and
    /// the message lists every failure.
    pub async fn report_pass(&self, component: Component, failures: &[String]) {
        if failures.is_empty() {
            self.record_success(component).await;
        } else {
            self.record_failure(component, failures.join("; ")).await;
        }
    }

    /// Mark the monitor loop as stopped
    pub async fn mark_stopped(&self, reason: impl Into<String>) {
        let mut components = self.components.write().await;
        components.insert(
            Component::Monitor,
            ComponentHealth::new(ComponentStatus::Unhealthy, Some(reason.into()), 0),
        );
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Current health of `component`
    pub async fn component(&self, component: Component) -> Option<ComponentHealth> {
        self.components.read().await.get(&component).cloned()
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = components
            .values()
            .map(|health| health.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse { status, components }
    }

    /// Ready once initialization finished, until the monitor loop stops
    pub async fn readiness(&self) -> ReadinessResponse {
        if !self.ready.load(Ordering::SeqCst) {
            return ReadinessResponse {
                ready: false,
                reason: Some("Collector not yet initialized".to_string()),
            };
        }

        match self.component(Component::Monitor).await {
            Some(monitor) if monitor.status == ComponentStatus::Unhealthy => ReadinessResponse {
                ready: false,
                reason: Some(format!(
                    "Monitor stopped: {}",
                    monitor.message.unwrap_or_default()
                )),
            },
            _ => ReadinessResponse {
                ready: true,
                reason: None,
            },
        }
    }
}
