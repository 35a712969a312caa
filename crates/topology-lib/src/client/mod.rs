//! Read access to the Kubernetes API
//!
//! Collectors only see the [`ApiCollectorClient`] capability. The
//! [`KubeApiClient`] adapter implements it on top of `kube`, and
//! [`MockApiClient`] serves canned objects in tests.

mod kube;
pub mod legacy;
mod mock;

pub use self::kube::{init_kube_client, KubeApiClient};
pub use legacy::{CronJobV1Beta1, IngressV1Beta1};
pub use mock::MockApiClient;

use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret,
    Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::storage::v1::VolumeAttachment;
use serde::{Deserialize, Serialize};

/// Major and minor version reported by the API server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: String,
    pub minor: String,
}

impl ServerVersion {
    pub fn new(major: impl Into<String>, minor: impl Into<String>) -> Self {
        Self {
            major: major.into(),
            minor: minor.into(),
        }
    }
}

/// Cluster-wide list operations used by the collectors
#[async_trait]
pub trait ApiCollectorClient: Send + Sync {
    async fn get_nodes(&self) -> Result<Vec<Node>>;
    async fn get_pods(&self) -> Result<Vec<Pod>>;
    async fn get_services(&self) -> Result<Vec<Service>>;
    async fn get_endpoints(&self) -> Result<Vec<Endpoints>>;
    async fn get_namespaces(&self) -> Result<Vec<Namespace>>;
    async fn get_config_maps(&self) -> Result<Vec<ConfigMap>>;
    async fn get_secrets(&self) -> Result<Vec<Secret>>;
    async fn get_persistent_volumes(&self) -> Result<Vec<PersistentVolume>>;
    async fn get_persistent_volume_claims(&self) -> Result<Vec<PersistentVolumeClaim>>;
    async fn get_deployments(&self) -> Result<Vec<Deployment>>;
    async fn get_replica_sets(&self) -> Result<Vec<ReplicaSet>>;
    async fn get_daemon_sets(&self) -> Result<Vec<DaemonSet>>;
    async fn get_stateful_sets(&self) -> Result<Vec<StatefulSet>>;
    async fn get_jobs(&self) -> Result<Vec<Job>>;
    async fn get_cron_jobs_v1(&self) -> Result<Vec<CronJob>>;
    async fn get_cron_jobs_v1b1(&self) -> Result<Vec<CronJobV1Beta1>>;
    async fn get_ingresses_net_v1(&self) -> Result<Vec<Ingress>>;
    async fn get_ingresses_ext_v1b1(&self) -> Result<Vec<IngressV1Beta1>>;
    async fn get_volume_attachments(&self) -> Result<Vec<VolumeAttachment>>;
    async fn get_version(&self) -> Result<ServerVersion>;
}
