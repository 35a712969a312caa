use super::legacy::{CronJobV1Beta1, IngressV1Beta1};
use super::{ApiCollectorClient, ServerVersion};
use ::kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams};
use ::kube::config::{KubeConfigOptions, Kubeconfig};
use ::kube::{Client, Config, Resource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret,
    Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::storage::v1::VolumeAttachment;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::path::Path;
use tracing::debug;

/// Build a client from an explicit kubeconfig, or in-cluster / `~/.kube/config`
pub async fn init_kube_client(kubeconfig: Option<&Path>) -> Result<Client> {
    match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig file: {}", path.display()))?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .with_context(|| {
                    format!("Failed to create config from kubeconfig: {}", path.display())
                })?;
            Client::try_from(config).context("Failed to create Kubernetes client from kubeconfig")
        }
        None => Client::try_default()
            .await
            .context("Failed to create Kubernetes client"),
    }
}

/// [`ApiCollectorClient`] backed by a `kube` client
#[derive(Clone)]
pub struct KubeApiClient {
    client: Client,
}

impl KubeApiClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn list_all<K>(&self) -> Result<Vec<K>>
    where
        K: Resource + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let plural = K::plural(&Default::default()).to_string();
        let api: Api<K> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list {}", plural))?;
        debug!(resource = %plural, count = list.items.len(), "Listed objects");
        Ok(list.items)
    }

    /// List a group/version the typed bindings no longer carry and decode it
    async fn list_legacy<T: DeserializeOwned>(&self, gvk: GroupVersionKind) -> Result<Vec<T>> {
        let resource = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        let list = api
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list {}", resource.api_version))?;

        list.items
            .into_iter()
            .map(|object| {
                let value = serde_json::to_value(&object)?;
                serde_json::from_value(value)
                    .with_context(|| format!("Failed to decode {} {}", gvk.kind, resource.api_version))
            })
            .collect()
    }
}

#[async_trait]
impl ApiCollectorClient for KubeApiClient {
    async fn get_nodes(&self) -> Result<Vec<Node>> {
        self.list_all().await
    }

    async fn get_pods(&self) -> Result<Vec<Pod>> {
        self.list_all().await
    }

    async fn get_services(&self) -> Result<Vec<Service>> {
        self.list_all().await
    }

    async fn get_endpoints(&self) -> Result<Vec<Endpoints>> {
        self.list_all().await
    }

    async fn get_namespaces(&self) -> Result<Vec<Namespace>> {
        self.list_all().await
    }

    async fn get_config_maps(&self) -> Result<Vec<ConfigMap>> {
        self.list_all().await
    }

    async fn get_secrets(&self) -> Result<Vec<Secret>> {
        self.list_all().await
    }

    async fn get_persistent_volumes(&self) -> Result<Vec<PersistentVolume>> {
        self.list_all().await
    }

    async fn get_persistent_volume_claims(&self) -> Result<Vec<PersistentVolumeClaim>> {
        self.list_all().await
    }

    async fn get_deployments(&self) -> Result<Vec<Deployment>> {
        self.list_all().await
    }

    async fn get_replica_sets(&self) -> Result<Vec<ReplicaSet>> {
        self.list_all().await
    }

    async fn get_daemon_sets(&self) -> Result<Vec<DaemonSet>> {
        self.list_all().await
    }

    async fn get_stateful_sets(&self) -> Result<Vec<StatefulSet>> {
        self.list_all().await
    }

    async fn get_jobs(&self) -> Result<Vec<Job>> {
        self.list_all().await
    }

    async fn get_cron_jobs_v1(&self) -> Result<Vec<CronJob>> {
        self.list_all().await
    }

    async fn get_cron_jobs_v1b1(&self) -> Result<Vec<CronJobV1Beta1>> {
        self.list_legacy(GroupVersionKind::gvk("batch", "v1beta1", CronJobV1Beta1::KIND))
            .await
    }

    async fn get_ingresses_net_v1(&self) -> Result<Vec<Ingress>> {
        self.list_all().await
    }

    async fn get_ingresses_ext_v1b1(&self) -> Result<Vec<IngressV1Beta1>> {
        self.list_legacy(GroupVersionKind::gvk("extensions", "v1beta1", IngressV1Beta1::KIND))
            .await
    }

    async fn get_volume_attachments(&self) -> Result<Vec<VolumeAttachment>> {
        self.list_all().await
    }

    async fn get_version(&self) -> Result<ServerVersion> {
        let info = self
            .client
            .apiserver_version()
            .await
            .context("Failed to fetch API server version")?;
        Ok(ServerVersion::new(info.major, info.minor))
    }
}
