//! Kubernetes API client for workload resource lookups
//!
//! Uses the in-cluster service account when running as a pod and falls back
//! to the local kubeconfig otherwise.

use super::{ClusterReader, DeploymentScale, PodLimits};
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Pod};
use kube::{
    api::{Api, ListParams},
    Client,
};
use tracing::{debug, info};

/// Cluster reader backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
}

impl KubeClusterReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a reader from the default client configuration
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        info!("Kubernetes API client initialized");
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn find_pod(&self, namespace: &str, partial_name: &str) -> Result<Option<String>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod_list = pods.list(&ListParams::default()).await?;

        let found = first_matching_pod(
            pod_list
                .items
                .iter()
                .filter_map(|pod| pod.metadata.name.as_deref()),
            partial_name,
        )
        .map(str::to_string);

        debug!(
            namespace = %namespace,
            pattern = %partial_name,
            pods = pod_list.items.len(),
            found = ?found,
            "Resolved pod by partial name"
        );

        Ok(found)
    }

    async fn pod_limits(&self, namespace: &str, pod: &str) -> Result<PodLimits> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = pods.get(pod).await?;

        let containers = pod.spec.map(|spec| spec.containers).unwrap_or_default();
        Ok(limits_from_containers(&containers))
    }

    async fn deployment_scale(
        &self,
        namespace: &str,
        deployment: &str,
    ) -> Result<DeploymentScale> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = deployments.get(deployment).await?;

        Ok(DeploymentScale {
            replicas: deployment.spec.and_then(|spec| spec.replicas),
            name: deployment.metadata.name,
        })
    }
}

/// First name containing `partial_name`, in the order given
pub fn first_matching_pod<'a, I>(names: I, partial_name: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().find(|name| name.contains(partial_name))
}

/// CPU and memory limits of the first container that declares any limits
pub fn limits_from_containers(containers: &[Container]) -> PodLimits {
    containers
        .iter()
        .filter_map(|container| container.resources.as_ref()?.limits.as_ref())
        .find(|limits| !limits.is_empty())
        .map(|limits| PodLimits {
            cpu: limits.get("cpu").map(|q| q.0.clone()),
            memory: limits.get("memory").map(|q| q.0.clone()),
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ResourceRequirements;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::collections::BTreeMap;

    fn container(name: &str, limits: &[(&str, &str)]) -> Container {
        let limits: BTreeMap<String, Quantity> = limits
            .iter()
            .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
            .collect();

        Container {
            name: name.to_string(),
            resources: Some(ResourceRequirements {
                limits: Some(limits),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn bare_container(name: &str) -> Container {
        Container {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_matching_pod_uses_listing_order() {
        let names = ["game-7d9f-abcde", "game-server-5c4b-xyz12", "game-7d9f-fghij"];

        assert_eq!(
            first_matching_pod(names, "game-7d9f"),
            Some("game-7d9f-abcde")
        );
        assert_eq!(
            first_matching_pod(names, "server"),
            Some("game-server-5c4b-xyz12")
        );
        assert_eq!(first_matching_pod(names, "database"), None);
    }

    #[test]
    fn test_limits_from_first_container_with_limits() {
        let containers = vec![
            bare_container("istio-proxy"),
            container("game", &[("cpu", "500m"), ("memory", "256Mi")]),
            container("sidecar", &[("cpu", "100m"), ("memory", "64Mi")]),
        ];

        let limits = limits_from_containers(&containers);

        assert_eq!(limits.cpu.as_deref(), Some("500m"));
        assert_eq!(limits.memory.as_deref(), Some("256Mi"));
    }

    #[test]
    fn test_limits_with_only_cpu() {
        let containers = vec![container("game", &[("cpu", "2")])];

        let limits = limits_from_containers(&containers);

        assert_eq!(limits.cpu.as_deref(), Some("2"));
        assert_eq!(limits.memory, None);
    }

    #[test]
    fn test_empty_limits_are_skipped() {
        let containers = vec![
            container("init", &[]),
            container("game", &[("memory", "1Gi")]),
        ];

        let limits = limits_from_containers(&containers);

        assert_eq!(limits.cpu, None);
        assert_eq!(limits.memory.as_deref(), Some("1Gi"));
    }

    #[test]
    fn test_no_limits_anywhere() {
        assert_eq!(limits_from_containers(&[]), PodLimits::default());
        assert_eq!(
            limits_from_containers(&[bare_container("game")]),
            PodLimits::default()
        );
    }
}
