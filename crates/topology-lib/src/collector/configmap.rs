use super::{meta_name, meta_namespace, ClusterTopologyCollector, ClusterTopologyCommon};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{ComponentType, DataExt};
use crate::sanitize::cut_data;
use async_trait::async_trait;

/// Emits ConfigMaps with oversized values truncated
pub struct ConfigMapCollector {
    common: ClusterTopologyCommon,
}

impl ConfigMapCollector {
    pub fn new(common: ClusterTopologyCommon) -> Self {
        Self { common }
    }
}

#[async_trait]
impl ClusterTopologyCollector for ConfigMapCollector {
    fn name(&self) -> &'static str {
        "configmap-collector"
    }

    async fn collect(&mut self) -> CollectorResult<()> {
        let config_maps = self
            .common
            .api_client()
            .get_config_maps()
            .await
            .map_err(|e| CollectorError::api("configmaps", e))?;
        let max_size = self.common.config().configmap_max_data_size;

        for mut config_map in config_maps {
            let namespace = meta_namespace(&config_map.metadata).to_string();
            let name = meta_name(&config_map.metadata).to_string();
            let external_id = self.common.urns().configmap_external_id(&namespace, &name);

            config_map.data = config_map.data.map(|data| cut_data(&data, max_size));

            let tags = self.common.init_tags(&config_map.metadata, "ConfigMap");
            let mut component = self.common.new_component(
                external_id.clone(),
                ComponentType::ConfigMap,
                &name,
                &tags,
                vec![external_id.clone()],
            );
            if !self.common.attach_object(
                &mut component,
                &config_map,
                &config_map.metadata,
                "ConfigMap",
            ) {
                component.data.put_non_empty("data", &config_map.data);
            }
            self.common.submit_component(component).await?;

            self.common
                .submit_namespace_relation(&namespace, &external_id)
                .await?;
        }

        Ok(())
    }
}
