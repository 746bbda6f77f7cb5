//! Read-only access to the workload's resource allocation
//!
//! This module provides the [`ClusterReader`] seam used by the monitor loop
//! and its Kubernetes API implementation. Nothing here mutates cluster state.

mod kubernetes;

pub use kubernetes::{first_matching_pod, limits_from_containers, KubeClusterReader};

use crate::error::Result;

pub use async_trait::async_trait;

/// CPU and memory limits of a pod, in orchestrator-native units
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodLimits {
    /// e.g. "500m"
    pub cpu: Option<String>,
    /// e.g. "256Mi"
    pub memory: Option<String>,
}

/// Replica count and name of a deployment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentScale {
    pub replicas: Option<i32>,
    pub name: Option<String>,
}

/// Trait for cluster state lookups
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// Name of the first pod in `namespace` whose name contains `partial_name`
    async fn find_pod(&self, namespace: &str, partial_name: &str) -> Result<Option<String>>;

    /// Limits of the first container of `pod` that declares any
    async fn pod_limits(&self, namespace: &str, pod: &str) -> Result<PodLimits>;

    /// Desired replica count of `deployment`
    async fn deployment_scale(&self, namespace: &str, deployment: &str)
        -> Result<DeploymentScale>;
}
