use super::{
    meta_name, meta_namespace, owner_references, send_or_cancel, ClusterTopologyCollector,
    ClusterTopologyCommon, Tags,
};
use crate::correlator::{
    ContainerCorrelation, ContainerPod, PodEndpointCorrelation, PodIdentifier, PodLabelCorrelation,
    VolumeCorrelation,
};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{Component, ComponentType, DataExt, RelationType};
use crate::source_properties::prune_pod_status;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

/// Output channels feeding the correlators
pub struct PodCorrelationSenders {
    pub containers: mpsc::Sender<ContainerCorrelation>,
    pub volumes: mpsc::Sender<VolumeCorrelation>,
    pub endpoints: mpsc::Sender<PodEndpointCorrelation>,
    pub labels: mpsc::Sender<PodLabelCorrelation>,
}

pub struct PodCollector {
    common: ClusterTopologyCommon,
    senders: PodCorrelationSenders,
}

impl PodCollector {
    pub fn new(common: ClusterTopologyCommon, senders: PodCorrelationSenders) -> Self {
        Self { common, senders }
    }

    fn pod_tags(&self, pod: &Pod) -> Tags {
        let mut tags = self.common.init_tags(&pod.metadata, "Pod");
        if let Some(account) = pod
            .spec
            .as_ref()
            .and_then(|s| s.service_account_name.as_deref())
            .filter(|a| !a.is_empty())
        {
            tags.insert("service-account".to_string(), account.to_string());
        }
        tags
    }

    fn pod_component(&self, pod: &Pod, tags: &Tags) -> Component {
        let namespace = meta_namespace(&pod.metadata);
        let name = meta_name(&pod.metadata);
        let status = pod.status.as_ref();

        let identifiers = status
            .and_then(|s| s.pod_ip.as_deref())
            .filter(|ip| !ip.is_empty())
            .map(|ip| vec![self.common.urns().pod_ip_identifier(namespace, name, ip)])
            .unwrap_or_default();

        let mut component = self.common.new_component(
            self.common.urns().pod_external_id(namespace, name),
            ComponentType::Pod,
            name,
            tags,
            identifiers,
        );

        if self
            .common
            .attach_object(&mut component, pod, &pod.metadata, "Pod")
        {
            let phase = status.and_then(|s| s.phase.as_deref()).unwrap_or_default();
            component
                .data
                .put_non_empty("status", json!({ "phase": phase }));
        } else {
            component.data.put_non_empty(
                "restartPolicy",
                pod.spec.as_ref().and_then(|s| s.restart_policy.as_ref()),
            );
            component
                .data
                .put_non_empty("status", status.map(prune_pod_status));
        }

        component
    }

    /// Ownership edges; returns whether a controller claimed the pod
    async fn submit_owner_relations(&self, pod: &Pod, pod_id: &str) -> CollectorResult<bool> {
        let namespace = meta_namespace(&pod.metadata);
        let phase = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or_default();

        let mut managed = false;
        for owner in owner_references(&pod.metadata) {
            let controller_id = match owner.kind.as_str() {
                "DaemonSet" | "Deployment" | "ReplicaSet" | "StatefulSet" => self
                    .common
                    .urns()
                    .external_id_for_kind(&owner.kind, namespace, &owner.name),
                "Job" if phase == "Succeeded" || phase == "Failed" => {
                    debug!(
                        pod = %meta_name(&pod.metadata),
                        job = %owner.name,
                        "Skipping relation to finished job"
                    );
                    None
                }
                "Job" => Some(self.common.urns().job_external_id(namespace, &owner.name)),
                _ => None,
            };

            if let Some(controller_id) = controller_id {
                self.common
                    .submit_relation(self.common.create_relation(
                        &controller_id,
                        pod_id,
                        RelationType::Controls,
                    ))
                    .await?;
                managed = true;
            }
        }
        Ok(managed)
    }

    async fn submit_config_relations(&self, pod: &Pod, pod_id: &str) -> CollectorResult<()> {
        let namespace = meta_namespace(&pod.metadata);
        let urns = self.common.urns();
        let containers = pod.spec.as_ref().map(|s| s.containers.as_slice()).unwrap_or_default();

        for container in containers {
            for env_from in container.env_from.iter().flatten() {
                let target = if let Some(name) = env_from.config_map_ref.as_ref().and_then(|r| r.name.as_deref()) {
                    urns.configmap_external_id(namespace, name)
                } else if let Some(name) = env_from.secret_ref.as_ref().and_then(|r| r.name.as_deref()) {
                    urns.secret_external_id(namespace, name)
                } else {
                    continue;
                };
                self.common
                    .submit_relation(self.common.create_relation(pod_id, &target, RelationType::Uses))
                    .await?;
            }

            for env in container.env.iter().flatten() {
                let Some(value_from) = env.value_from.as_ref() else { continue };
                let target = if let Some(name) = value_from.config_map_key_ref.as_ref().and_then(|r| r.name.as_deref()) {
                    urns.configmap_external_id(namespace, name)
                } else if let Some(name) = value_from.secret_key_ref.as_ref().and_then(|r| r.name.as_deref()) {
                    urns.secret_external_id(namespace, name)
                } else {
                    continue;
                };
                self.common
                    .submit_relation(self.common.create_relation(
                        pod_id,
                        &target,
                        RelationType::UsesValue,
                    ))
                    .await?;
            }
        }
        Ok(())
    }

    async fn publish_correlations(&self, pod: Pod, pod_id: String, tags: Tags) -> CollectorResult<()> {
        let cancel = self.common.cancellation();
        let namespace = meta_namespace(&pod.metadata).to_string();
        let name = meta_name(&pod.metadata).to_string();
        let spec = pod.spec.unwrap_or_default();
        let status = pod.status.unwrap_or_default();
        let node_name = spec.node_name.clone().unwrap_or_default();

        send_or_cancel(
            &self.senders.labels,
            PodLabelCorrelation {
                labels: pod.metadata.labels.clone().unwrap_or_default(),
                namespace: namespace.clone(),
                pod_name: name.clone(),
            },
            cancel,
            "pod label",
        )
        .await?;

        if spec.host_network == Some(true) {
            let host_ip = status.host_ip.as_deref().unwrap_or_default();
            for container in &spec.containers {
                for port in container.ports.iter().flatten() {
                    if port.host_port.unwrap_or(0) == 0 || host_ip.is_empty() {
                        continue;
                    }
                    send_or_cancel(
                        &self.senders.endpoints,
                        PodEndpointCorrelation {
                            host_endpoint: format!("{}:{}", host_ip, port.container_port),
                            namespace: namespace.clone(),
                            pod_name: name.clone(),
                        },
                        cancel,
                        "pod endpoint",
                    )
                    .await?;
                }
            }
        }

        let volumes = spec.volumes.clone().unwrap_or_default();
        if !volumes.is_empty() {
            send_or_cancel(
                &self.senders.volumes,
                VolumeCorrelation {
                    pod: PodIdentifier {
                        external_id: pod_id.clone(),
                        namespace: namespace.clone(),
                        name: name.clone(),
                        node_name: node_name.clone(),
                        creation_time: pod.metadata.creation_timestamp.clone(),
                    },
                    volumes,
                    containers: spec.containers.clone(),
                },
                cancel,
                "volume",
            )
            .await?;
        }

        let container_statuses = status.container_statuses.clone().unwrap_or_default();
        if !container_statuses.is_empty() {
            send_or_cancel(
                &self.senders.containers,
                ContainerCorrelation {
                    pod: ContainerPod {
                        external_id: pod_id,
                        name,
                        labels: tags,
                        pod_ip: status.pod_ip.clone().unwrap_or_default(),
                        namespace,
                        node_name,
                        phase: status.phase.clone().unwrap_or_default(),
                    },
                    containers: spec.containers,
                    container_statuses,
                },
                cancel,
                "container",
            )
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl ClusterTopologyCollector for PodCollector {
    fn name(&self) -> &'static str {
        "pod-collector"
    }

    async fn collect(&mut self) -> CollectorResult<()> {
        let pods = self
            .common
            .api_client()
            .get_pods()
            .await
            .map_err(|e| CollectorError::api("pods", e))?;

        for pod in pods {
            let tags = self.pod_tags(&pod);
            let component = self.pod_component(&pod, &tags);
            let pod_id = component.external_id.clone();
            self.common.submit_component(component).await?;

            if let Some(node_name) = pod
                .spec
                .as_ref()
                .and_then(|s| s.node_name.as_deref())
                .filter(|n| !n.is_empty())
            {
                let node_id = self.common.urns().node_external_id(node_name);
                self.common
                    .submit_relation(self.common.create_relation(
                        &pod_id,
                        &node_id,
                        RelationType::ScheduledOn,
                    ))
                    .await?;
            }

            if !self.submit_owner_relations(&pod, &pod_id).await? {
                self.common
                    .submit_namespace_relation(meta_namespace(&pod.metadata), &pod_id)
                    .await?;
            }

            self.submit_config_relations(&pod, &pod_id).await?;
            self.publish_correlations(pod, pod_id, tags).await?;
        }

        Ok(())
    }
}
