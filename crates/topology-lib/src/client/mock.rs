use super::legacy::{CronJobV1Beta1, IngressV1Beta1};
use super::{ApiCollectorClient, ServerVersion};
use anyhow::{bail, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret,
    Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::storage::v1::VolumeAttachment;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory [`ApiCollectorClient`] with canned objects.
///
/// A resource added through [`MockApiClient::failing`] returns an error
/// instead of its list. Resource names are the plural kind (`pods`,
/// `cronjobs.v1beta1`, `version`, ...).
#[derive(Debug)]
pub struct MockApiClient {
    pub nodes: Vec<Node>,
    pub pods: Vec<Pod>,
    pub services: Vec<Service>,
    pub endpoints: Vec<Endpoints>,
    pub namespaces: Vec<Namespace>,
    pub config_maps: Vec<ConfigMap>,
    pub secrets: Vec<Secret>,
    pub persistent_volumes: Vec<PersistentVolume>,
    pub persistent_volume_claims: Vec<PersistentVolumeClaim>,
    pub deployments: Vec<Deployment>,
    pub replica_sets: Vec<ReplicaSet>,
    pub daemon_sets: Vec<DaemonSet>,
    pub stateful_sets: Vec<StatefulSet>,
    pub jobs: Vec<Job>,
    pub cron_jobs_v1: Vec<CronJob>,
    pub cron_jobs_v1b1: Vec<CronJobV1Beta1>,
    pub ingresses_net_v1: Vec<Ingress>,
    pub ingresses_ext_v1b1: Vec<IngressV1Beta1>,
    pub volume_attachments: Vec<VolumeAttachment>,
    pub version: ServerVersion,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl Default for MockApiClient {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            pods: Vec::new(),
            services: Vec::new(),
            endpoints: Vec::new(),
            namespaces: Vec::new(),
            config_maps: Vec::new(),
            secrets: Vec::new(),
            persistent_volumes: Vec::new(),
            persistent_volume_claims: Vec::new(),
            deployments: Vec::new(),
            replica_sets: Vec::new(),
            daemon_sets: Vec::new(),
            stateful_sets: Vec::new(),
            jobs: Vec::new(),
            cron_jobs_v1: Vec::new(),
            cron_jobs_v1b1: Vec::new(),
            ingresses_net_v1: Vec::new(),
            ingresses_ext_v1b1: Vec::new(),
            volume_attachments: Vec::new(),
            version: ServerVersion::new("1", "28"),
            failing: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl MockApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, major: &str, minor: &str) -> Self {
        self.version = ServerVersion::new(major, minor);
        self
    }

    /// Make every call for `resource` fail
    pub fn failing(mut self, resource: &str) -> Self {
        self.failing.insert(resource.to_string());
        self
    }

    /// Number of API calls served so far, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn serve<T: Clone>(&self, resource: &str, items: &[T]) -> Result<Vec<T>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failing.contains(resource) {
            bail!("mock API failure listing {}", resource);
        }
        Ok(items.to_vec())
    }
}

#[async_trait]
impl ApiCollectorClient for MockApiClient {
    async fn get_nodes(&self) -> Result<Vec<Node>> {
        self.serve("nodes", &self.nodes)
    }

    async fn get_pods(&self) -> Result<Vec<Pod>> {
        self.serve("pods", &self.pods)
    }

    async fn get_services(&self) -> Result<Vec<Service>> {
        self.serve("services", &self.services)
    }

    async fn get_endpoints(&self) -> Result<Vec<Endpoints>> {
        self.serve("endpoints", &self.endpoints)
    }

    async fn get_namespaces(&self) -> Result<Vec<Namespace>> {
        self.serve("namespaces", &self.namespaces)
    }

    async fn get_config_maps(&self) -> Result<Vec<ConfigMap>> {
        self.serve("configmaps", &self.config_maps)
    }

    async fn get_secrets(&self) -> Result<Vec<Secret>> {
        self.serve("secrets", &self.secrets)
    }

    async fn get_persistent_volumes(&self) -> Result<Vec<PersistentVolume>> {
        self.serve("persistentvolumes", &self.persistent_volumes)
    }

    async fn get_persistent_volume_claims(&self) -> Result<Vec<PersistentVolumeClaim>> {
        self.serve("persistentvolumeclaims", &self.persistent_volume_claims)
    }

    async fn get_deployments(&self) -> Result<Vec<Deployment>> {
        self.serve("deployments", &self.deployments)
    }

    async fn get_replica_sets(&self) -> Result<Vec<ReplicaSet>> {
        self.serve("replicasets", &self.replica_sets)
    }

    async fn get_daemon_sets(&self) -> Result<Vec<DaemonSet>> {
        self.serve("daemonsets", &self.daemon_sets)
    }

    async fn get_stateful_sets(&self) -> Result<Vec<StatefulSet>> {
        self.serve("statefulsets", &self.stateful_sets)
    }

    async fn get_jobs(&self) -> Result<Vec<Job>> {
        self.serve("jobs", &self.jobs)
    }

    async fn get_cron_jobs_v1(&self) -> Result<Vec<CronJob>> {
        self.serve("cronjobs", &self.cron_jobs_v1)
    }

    async fn get_cron_jobs_v1b1(&self) -> Result<Vec<CronJobV1Beta1>> {
        self.serve("cronjobs.v1beta1", &self.cron_jobs_v1b1)
    }

    async fn get_ingresses_net_v1(&self) -> Result<Vec<Ingress>> {
        self.serve("ingresses", &self.ingresses_net_v1)
    }

    async fn get_ingresses_ext_v1b1(&self) -> Result<Vec<IngressV1Beta1>> {
        self.serve("ingresses.v1beta1", &self.ingresses_ext_v1b1)
    }

    async fn get_volume_attachments(&self) -> Result<Vec<VolumeAttachment>> {
        self.serve("volumeattachments", &self.volume_attachments)
    }

    async fn get_version(&self) -> Result<ServerVersion> {
        self.serve("version", std::slice::from_ref(&self.version))
            .map(|mut v| v.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_and_fails() {
        let mut client = MockApiClient::new().failing("secrets");
        client.pods.push(Pod::default());

        assert_eq!(client.get_pods().await.unwrap().len(), 1);
        assert!(client.get_secrets().await.is_err());
        assert_eq!(client.get_version().await.unwrap().minor, "28");
        assert_eq!(client.calls(), 3);
    }
}
