use super::{meta_name, meta_namespace, put_legacy_meta, ClusterTopologyCollector, ClusterTopologyCommon};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{Component, ComponentType, DataExt, RelationType};
use crate::versions::{list_ingresses, IngressObject};
use async_trait::async_trait;
use tracing::debug;

/// Collects Ingresses from `networking.k8s.io/v1` or `extensions/v1beta1`
pub struct IngressCollector {
    common: ClusterTopologyCommon,
}

impl IngressCollector {
    pub fn new(common: ClusterTopologyCommon) -> Self {
        Self { common }
    }

    fn ingress_component(&self, ingress: &IngressObject) -> Component {
        let meta = ingress.metadata();
        let namespace = meta_namespace(meta);
        let name = meta_name(meta);

        let tags = self.common.init_tags(meta, "Ingress");
        let mut component = self.common.new_component(
            self.common.urns().ingress_external_id(namespace, name),
            ComponentType::Ingress,
            name,
            &tags,
            Vec::new(),
        );
        if self.common.is_source_properties_enabled() {
            component.source_properties =
                Some(ingress.source_properties(self.common.is_expose_status_enabled()));
        } else {
            put_legacy_meta(&mut component.data, meta, ingress.kind());
        }
        component
    }

    /// Load balancer address fronting the ingress
    fn endpoint_component(&self, ingress: &IngressObject, point: &str) -> Component {
        let meta = ingress.metadata();
        let tags = self.common.init_tags(meta, "Endpoint");
        let mut component = self.common.new_component(
            self.common.urns().endpoint_external_id(point),
            ComponentType::Endpoint,
            point,
            &tags,
            Vec::new(),
        );
        component
            .data
            .put_non_empty("creationTimestamp", &meta.creation_timestamp);
        component
    }
}

#[async_trait]
impl ClusterTopologyCollector for IngressCollector {
    fn name(&self) -> &'static str {
        "ingress-collector"
    }

    async fn collect(&mut self) -> CollectorResult<()> {
        let ingresses = list_ingresses(self.common.api_client())
            .await
            .map_err(|e| CollectorError::api("ingresses", e))?;

        for ingress in ingresses {
            let namespace = meta_namespace(ingress.metadata());
            let component = self.ingress_component(&ingress);
            let ingress_id = component.external_id.clone();
            self.common.submit_component(component).await?;

            let services = ingress
                .default_service_name()
                .into_iter()
                .chain(ingress.rule_service_names());
            for service in services {
                let service_id = self.common.urns().service_external_id(namespace, service);
                self.common
                    .submit_relation(self.common.create_relation(
                        &ingress_id,
                        &service_id,
                        RelationType::Routes,
                    ))
                    .await?;
            }

            for point in ingress.ingress_points() {
                debug!(ingress = %ingress_id, point = %point, "Mapping ingress point to endpoint");
                let endpoint = self.endpoint_component(&ingress, &point);
                let endpoint_id = endpoint.external_id.clone();
                self.common.submit_component(endpoint).await?;
                self.common
                    .submit_relation(self.common.create_relation(
                        &endpoint_id,
                        &ingress_id,
                        RelationType::Routes,
                    ))
                    .await?;
            }

            self.common
                .submit_namespace_relation(namespace, &ingress_id)
                .await?;
        }

        Ok(())
    }
}
