use super::{meta_name, ClusterTopologyCollector, ClusterTopologyCommon};
use crate::error::{CollectorError, CollectorResult};
use crate::models::ComponentType;
use async_trait::async_trait;

pub struct NamespaceCollector {
    common: ClusterTopologyCommon,
}

impl NamespaceCollector {
    pub fn new(common: ClusterTopologyCommon) -> Self {
        Self { common }
    }
}

#[async_trait]
impl ClusterTopologyCollector for NamespaceCollector {
    fn name(&self) -> &'static str {
        "namespace-collector"
    }

    async fn collect(&mut self) -> CollectorResult<()> {
        let namespaces = self
            .common
            .api_client()
            .get_namespaces()
            .await
            .map_err(|e| CollectorError::api("namespaces", e))?;

        for namespace in namespaces {
            let name = meta_name(&namespace.metadata);
            let tags = self.common.init_tags(&namespace.metadata, "Namespace");
            let mut component = self.common.new_component(
                self.common.urns().namespace_external_id(name),
                ComponentType::Namespace,
                name,
                &tags,
                Vec::new(),
            );
            self.common
                .attach_object(&mut component, &namespace, &namespace.metadata, "Namespace");

            self.common.submit_component(component).await?;
        }

        Ok(())
    }
}
