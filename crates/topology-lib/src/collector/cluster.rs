use super::{ClusterTopologyCollector, ClusterTopologyCommon};
use crate::error::{CollectorError, CollectorResult};
use crate::models::ComponentType;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

/// Emits the single cluster component every node belongs to
pub struct ClusterCollector {
    common: ClusterTopologyCommon,
}

impl ClusterCollector {
    pub fn new(common: ClusterTopologyCommon) -> Self {
        Self { common }
    }
}

#[async_trait]
impl ClusterTopologyCollector for ClusterCollector {
    fn name(&self) -> &'static str {
        "cluster-collector"
    }

    async fn collect(&mut self) -> CollectorResult<()> {
        let instance = self.common.instance();
        if !instance.is_complete() {
            return Err(CollectorError::InvalidInstance {
                instance_type: instance.instance_type.clone(),
                url: instance.url.clone(),
            });
        }

        let external_id = self.common.urns().cluster_external_id();
        let tags = self.common.init_tags(&ObjectMeta::default(), "Cluster");
        let component = self.common.new_component(
            external_id,
            ComponentType::Cluster,
            &instance.url,
            &tags,
            Vec::new(),
        );

        debug!(external_id = %component.external_id, "Submitting cluster component");
        self.common.submit_component(component).await
    }
}
