use super::{meta_name, meta_namespace, ClusterTopologyCollector, ClusterTopologyCommon};
use crate::correlator::{map_persistent_volume, K8sVolumeSource};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{Component, ComponentType, DataExt, RelationType};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Emits PersistentVolumes with their backing stores, and PersistentVolumeClaims
pub struct PersistentVolumeCollector {
    common: ClusterTopologyCommon,
}

impl PersistentVolumeCollector {
    pub fn new(common: ClusterTopologyCommon) -> Self {
        Self { common }
    }

    fn volume_component(&self, pv: &PersistentVolume, node: Option<&String>) -> Component {
        let name = meta_name(&pv.metadata);
        let mut tags = self.common.init_tags(&pv.metadata, "PersistentVolume");
        if let Some(node) = node {
            tags.insert("persistent-volume-node".to_string(), node.clone());
        }

        let mut component = self.common.new_component(
            self.common.urns().persistent_volume_external_id(name),
            ComponentType::PersistentVolume,
            name,
            &tags,
            Vec::new(),
        );
        if !self
            .common
            .attach_object(&mut component, pv, &pv.metadata, "PersistentVolume")
        {
            let status = pv.status.as_ref();
            component.data.put_non_empty(
                "storageClassName",
                pv.spec.as_ref().and_then(|s| s.storage_class_name.as_ref()),
            );
            component
                .data
                .put_non_empty("status", status.and_then(|s| s.phase.as_ref()));
            component
                .data
                .put_non_empty("statusMessage", status.and_then(|s| s.message.as_ref()));
        }
        component
    }

    fn volume_source_component(&self, pv: &PersistentVolume) -> Option<Component> {
        let (mapped, source) = map_persistent_volume(
            self.common.urns(),
            pv,
            self.common.config().csi_pv_mapper_enabled,
        )?;

        let mut tags = self.common.init_tags(&pv.metadata, "VolumeSource");
        tags.extend(mapped.tags);
        let mut component = self.common.new_component(
            mapped.external_id,
            ComponentType::VolumeSource,
            &mapped.name,
            &tags,
            mapped.identifiers,
        );

        if self.common.is_source_properties_enabled() {
            let record = K8sVolumeSource::new(
                ObjectMeta {
                    name: Some(mapped.name.clone()),
                    namespace: pv.metadata.namespace.clone(),
                    creation_timestamp: pv.metadata.creation_timestamp.clone(),
                    ..Default::default()
                },
                source,
            );
            component.source_properties = Some(self.common.source_properties(&record));
        } else {
            component.data.put_non_empty("source", source);
        }
        Some(component)
    }

    fn claim_component(&self, claim: &PersistentVolumeClaim) -> Component {
        let namespace = meta_namespace(&claim.metadata);
        let name = meta_name(&claim.metadata);
        let tags = self.common.init_tags(&claim.metadata, "PersistentVolumeClaim");
        let mut component = self.common.new_component(
            self.common
                .urns()
                .persistent_volume_claim_external_id(namespace, name),
            ComponentType::PersistentVolumeClaim,
            name,
            &tags,
            Vec::new(),
        );
        if !self.common.attach_object(
            &mut component,
            claim,
            &claim.metadata,
            "PersistentVolumeClaim",
        ) {
            component.data.put_non_empty(
                "storageClassName",
                claim.spec.as_ref().and_then(|s| s.storage_class_name.as_ref()),
            );
            component.data.put_non_empty(
                "status",
                claim.status.as_ref().and_then(|s| s.phase.as_ref()),
            );
        }
        component
    }

    async fn collect_volumes(&self) -> CollectorResult<()> {
        let client = self.common.api_client();
        let volumes = client
            .get_persistent_volumes()
            .await
            .map_err(|e| CollectorError::api("persistentvolumes", e))?;

        let attachments = client.get_volume_attachments().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list volume attachments, skipping node relations");
            Vec::new()
        });
        let node_by_volume: HashMap<String, String> = attachments
            .into_iter()
            .filter_map(|va| Some((va.spec.source.persistent_volume_name?, va.spec.node_name)))
            .collect();

        for pv in volumes {
            let name = meta_name(&pv.metadata);
            let node = node_by_volume.get(name);
            let component = self.volume_component(&pv, node);
            let pv_id = component.external_id.clone();
            self.common.submit_component(component).await?;

            match self.volume_source_component(&pv) {
                Some(source) => {
                    let source_id = source.external_id.clone();
                    self.common.submit_component(source).await?;
                    self.common
                        .submit_relation(self.common.create_relation(
                            &pv_id,
                            &source_id,
                            RelationType::Exposes,
                        ))
                        .await?;
                }
                None => debug!(persistent_volume = %name, "Unknown volume source, skipping it"),
            }

            if let Some(node) = node {
                let node_id = self.common.urns().node_external_id(node);
                self.common
                    .submit_relation(self.common.create_relation(
                        &node_id,
                        &pv_id,
                        RelationType::Exposes,
                    ))
                    .await?;
            }
        }
        Ok(())
    }

    async fn collect_claims(&self) -> CollectorResult<()> {
        let claims = self
            .common
            .api_client()
            .get_persistent_volume_claims()
            .await
            .map_err(|e| CollectorError::api("persistentvolumeclaims", e))?;

        for claim in claims {
            let component = self.claim_component(&claim);
            let claim_id = component.external_id.clone();
            self.common.submit_component(component).await?;

            if let Some(volume_name) = claim
                .spec
                .as_ref()
                .and_then(|s| s.volume_name.as_deref())
                .filter(|v| !v.is_empty())
            {
                let pv_id = self.common.urns().persistent_volume_external_id(volume_name);
                self.common
                    .submit_relation(self.common.create_relation(
                        &claim_id,
                        &pv_id,
                        RelationType::Exposes,
                    ))
                    .await?;
            }

            self.common
                .submit_namespace_relation(meta_namespace(&claim.metadata), &claim_id)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterTopologyCollector for PersistentVolumeCollector {
    fn name(&self) -> &'static str {
        "persistent-volume-collector"
    }

    async fn collect(&mut self) -> CollectorResult<()> {
        let resources = &self.common.config().resources;
        if resources.persistentvolumes {
            self.collect_volumes().await?;
        }
        if resources.persistentvolumeclaims {
            self.collect_claims().await?;
        }
        Ok(())
    }
}
