use super::{
    drain, map_pod_volume, ClusterTopologyCorrelator, K8sVolume, MappedVolume, PodIdentifier,
    PodVolumeContext, VolumeCorrelation, VolumeTarget,
};
use crate::collector::{meta_name, meta_namespace, ClusterTopologyCommon};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{Component, ComponentType, Data, DataExt, RelationType};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

type ClaimLookup = HashMap<(String, String), String>;

/// Links pods and containers to the volumes they claim and mount
pub struct VolumeCorrelator {
    common: ClusterTopologyCommon,
    volumes: mpsc::Receiver<VolumeCorrelation>,
}

impl VolumeCorrelator {
    pub fn new(common: ClusterTopologyCommon, volumes: mpsc::Receiver<VolumeCorrelation>) -> Self {
        Self { common, volumes }
    }

    async fn claim_lookup(&self) -> anyhow::Result<ClaimLookup> {
        let claims = self.common.api_client().get_persistent_volume_claims().await?;
        let urns = self.common.urns();
        Ok(claims
            .iter()
            .map(|claim| {
                let namespace = meta_namespace(&claim.metadata);
                let name = meta_name(&claim.metadata);
                (
                    (namespace.to_string(), name.to_string()),
                    urns.persistent_volume_claim_external_id(namespace, name),
                )
            })
            .collect())
    }

    fn volume_component(&self, pod: &PodIdentifier, volume: &Volume, mapped: MappedVolume) -> Component {
        let meta = ObjectMeta {
            namespace: Some(pod.namespace.clone()),
            ..Default::default()
        };
        let mut tags = self.common.init_tags(&meta, "Volume");
        tags.extend(mapped.tags);

        let mut component = self.common.new_component(
            mapped.external_id,
            ComponentType::Volume,
            &volume.name,
            &tags,
            mapped.identifiers,
        );

        if self.common.is_source_properties_enabled() {
            let record = K8sVolume::new(
                ObjectMeta {
                    name: Some(volume.name.clone()),
                    namespace: Some(pod.namespace.clone()),
                    creation_timestamp: pod.creation_time.clone(),
                    ..Default::default()
                },
                volume.clone(),
            );
            component.source_properties = Some(self.common.source_properties(&record));
        } else {
            let mut source = match serde_json::to_value(volume) {
                Ok(Value::Object(map)) => map,
                _ => Data::new(),
            };
            source.remove("name");
            component.data.put_non_empty("source", source);
        }
        component
    }

    /// Resolve one pod volume to the component it points at, creating it
    /// when no collector emits it.
    async fn resolve_volume(
        &self,
        pod: &PodIdentifier,
        volume: &Volume,
        claims: Option<&ClaimLookup>,
    ) -> CollectorResult<Option<Resolved>> {
        if volume.downward_api.is_some() {
            return Ok(Some(Resolved::Pod(pod.external_id.clone())));
        }

        if let Some(claim) = volume.persistent_volume_claim.as_ref() {
            let key = (pod.namespace.clone(), claim.claim_name.clone());
            return match claims.and_then(|c| c.get(&key)) {
                Some(claim_id) => Ok(Some(Resolved::Volume(claim_id.clone()))),
                None => {
                    warn!(
                        pod = %pod.external_id,
                        claim = %claim.claim_name,
                        "Unknown PersistentVolumeClaim referenced from pod"
                    );
                    Ok(None)
                }
            };
        }

        let ctx = PodVolumeContext {
            urns: self.common.urns(),
            namespace: &pod.namespace,
            pod_name: &pod.name,
            node_name: &pod.node_name,
        };
        match map_pod_volume(&ctx, volume) {
            VolumeTarget::Existing(external_id) => Ok(Some(Resolved::Volume(external_id))),
            VolumeTarget::Create(mapped) => {
                let component = self.volume_component(pod, volume, mapped);
                let external_id = component.external_id.clone();
                self.common.submit_component(component).await?;
                Ok(Some(Resolved::Volume(external_id)))
            }
        }
    }

    async fn correlate_pod(
        &self,
        correlation: &VolumeCorrelation,
        claims: Option<&ClaimLookup>,
    ) -> CollectorResult<()> {
        let pod = &correlation.pod;
        let mut targets: HashMap<&str, String> = HashMap::new();

        for volume in &correlation.volumes {
            let target = match self.resolve_volume(pod, volume, claims).await? {
                Some(Resolved::Volume(target)) => {
                    trace!(pod = %pod.external_id, volume = %target, "Pod claims volume");
                    self.common
                        .submit_relation(self.common.create_relation(
                            &pod.external_id,
                            &target,
                            RelationType::Claims,
                        ))
                        .await?;
                    target
                }
                // mounts of the pod's own metadata point back at the pod
                Some(Resolved::Pod(pod_id)) => pod_id,
                None => continue,
            };
            targets.insert(volume.name.as_str(), target);
        }

        for container in &correlation.containers {
            for mount in container.volume_mounts.iter().flatten() {
                let Some(target) = targets.get(mount.name.as_str()) else {
                    if claims.is_some() {
                        warn!(
                            pod = %pod.external_id,
                            container = %container.name,
                            volume = %mount.name,
                            "Container mounts an unknown volume"
                        );
                    } else {
                        debug!(
                            pod = %pod.external_id,
                            container = %container.name,
                            volume = %mount.name,
                            "Container mounts an unresolved volume"
                        );
                    }
                    continue;
                };
                let container_id = self.common.urns().container_external_id(
                    &pod.namespace,
                    &pod.name,
                    &container.name,
                );
                self.common
                    .submit_relation(self.common.create_relation_data(
                        &container_id,
                        target,
                        RelationType::Mounts,
                        mount_data(mount),
                    ))
                    .await?;
            }
        }
        Ok(())
    }
}

/// Component a pod volume resolves to
enum Resolved {
    /// The pod itself, e.g. a downward API volume
    Pod(String),
    Volume(String),
}

fn mount_data(mount: &VolumeMount) -> Data {
    let mut data = Data::new();
    data.insert("name".to_string(), Value::String(mount.name.clone()));
    data.insert("readOnly".to_string(), Value::Bool(mount.read_only.unwrap_or(false)));
    data.insert("mountPath".to_string(), Value::String(mount.mount_path.clone()));
    data.insert(
        "subPath".to_string(),
        Value::String(mount.sub_path.clone().unwrap_or_default()),
    );
    data.insert(
        "mountPropagation".to_string(),
        Value::String(mount.mount_propagation.clone().unwrap_or_default()),
    );
    data
}

#[async_trait]
impl ClusterTopologyCorrelator for VolumeCorrelator {
    fn name(&self) -> &'static str {
        "volume-correlator"
    }

    async fn correlate(&mut self) -> CollectorResult<()> {
        let mut lookup_error = None;
        let claims = if self.common.config().discover_persistent_volume_claims() {
            match self.claim_lookup().await {
                Ok(claims) => Some(claims),
                Err(e) => {
                    warn!(error = %e, "Failed to list persistent volume claims");
                    lookup_error = Some(e);
                    None
                }
            }
        } else {
            None
        };

        // the pod collector blocks until its volume channel is drained
        let correlations = drain(&mut self.volumes).await;
        if let Some(e) = lookup_error {
            return Err(CollectorError::api("persistentvolumeclaims", e));
        }

        for correlation in &correlations {
            self.correlate_pod(correlation, claims.as_ref()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_data_defaults() {
        let mount = VolumeMount {
            name: "data".to_string(),
            mount_path: "/var/lib/data".to_string(),
            ..Default::default()
        };
        let data = mount_data(&mount);
        assert_eq!(data["name"], "data");
        assert_eq!(data["readOnly"], false);
        assert_eq!(data["mountPath"], "/var/lib/data");
        assert_eq!(data["subPath"], "");
        assert_eq!(data["mountPropagation"], "");
    }
}
