use super::{
    meta_name, meta_namespace, put_legacy_meta, send_or_cancel, ClusterTopologyCollector,
    ClusterTopologyCommon,
};
use crate::correlator::{EndpointId, ServiceEndpointCorrelation, ServiceSelectorCorrelation};
use crate::dns::DnsResolver;
use crate::error::{CollectorError, CollectorResult};
use crate::models::{Component, ComponentType, RelationType};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const EXTERNAL_NAME: &str = "ExternalName";
const NODE_PORT: &str = "NodePort";
const LOAD_BALANCER: &str = "LoadBalancer";
const CLUSTER_IP: &str = "ClusterIP";

pub struct ServiceCollector {
    common: ClusterTopologyCommon,
    resolver: Arc<dyn DnsResolver>,
    endpoints: mpsc::Sender<ServiceEndpointCorrelation>,
    selectors: mpsc::Sender<ServiceSelectorCorrelation>,
}

impl ServiceCollector {
    pub fn new(
        common: ClusterTopologyCommon,
        resolver: Arc<dyn DnsResolver>,
        endpoints: mpsc::Sender<ServiceEndpointCorrelation>,
        selectors: mpsc::Sender<ServiceSelectorCorrelation>,
    ) -> Self {
        Self {
            common,
            resolver,
            endpoints,
            selectors,
        }
    }

    fn service_component(&self, service: &Service) -> Component {
        let namespace = meta_namespace(&service.metadata);
        let name = meta_name(&service.metadata);
        let spec = service.spec.clone().unwrap_or_default();

        let mut tags = self.common.init_tags(&service.metadata, "Service");
        tags.insert(
            "service-type".to_string(),
            spec.type_.clone().unwrap_or_else(|| CLUSTER_IP.to_string()),
        );
        if spec.cluster_ip.as_deref() == Some("None") {
            tags.insert("service".to_string(), "headless".to_string());
        }

        let identifiers = self.service_identifiers(service);
        debug!(service = %name, identifiers = ?identifiers, "Created service identifiers");

        let mut component = self.common.new_component(
            self.common.urns().service_external_id(namespace, name),
            ComponentType::Service,
            name,
            &tags,
            identifiers,
        );
        self.common
            .attach_object(&mut component, service, &service.metadata, "Service");
        component
    }

    fn service_identifiers(&self, service: &Service) -> Vec<String> {
        let urns = self.common.urns();
        let namespace = meta_namespace(&service.metadata);
        let name = meta_name(&service.metadata);
        let spec = service.spec.clone().unwrap_or_default();
        let service_type = spec.type_.as_deref().unwrap_or(CLUSTER_IP);
        let ports = spec.ports.unwrap_or_default();
        let cluster_ip = spec
            .cluster_ip
            .as_deref()
            .filter(|ip| !ip.is_empty() && *ip != "None");

        let mut identifiers = Vec::new();

        // external IPs are not managed by the cluster, so no cluster url here
        for ip in spec.external_ips.iter().flatten().filter(|ip| !ip.is_empty()) {
            for port in &ports {
                identifiers.push(format!("urn:endpoint:/{}:{}", ip, port.port));
                let node_port = port.node_port.unwrap_or(0);
                if service_type == NODE_PORT && node_port != 0 {
                    identifiers.push(format!("urn:endpoint:/{}:{}", ip, node_port));
                }
            }
        }

        match service_type {
            CLUSTER_IP => {
                if let Some(ip) = cluster_ip {
                    identifiers.push(urns.endpoint_external_id(ip));
                }
            }
            NODE_PORT => {
                if let Some(ip) = cluster_ip {
                    identifiers.push(urns.endpoint_external_id(ip));
                    for node_port in ports.iter().filter_map(|p| p.node_port).filter(|p| *p != 0) {
                        identifiers.push(urns.endpoint_external_id(&format!("{}:{}", ip, node_port)));
                    }
                }
            }
            LOAD_BALANCER => {
                if let Some(lb_ip) = spec.load_balancer_ip.as_deref().filter(|ip| !ip.is_empty()) {
                    identifiers.push(urns.endpoint_external_id(lb_ip));
                }
                if let Some(ip) = cluster_ip {
                    identifiers.push(urns.endpoint_external_id(ip));
                }
            }
            _ => {}
        }

        let ingress_points = service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref());
        for point in ingress_points.into_iter().flatten() {
            for address in [point.ip.as_deref(), point.hostname.as_deref()].into_iter().flatten() {
                if !address.is_empty() {
                    identifiers.push(format!("urn:ingress-point:/{}", address));
                }
            }
        }

        identifiers.push(urns.service_identifier(namespace, name));
        identifiers
    }

    /// The `external-service` sibling of an ExternalName service
    async fn external_service_component(&self, service: &Service) -> Component {
        let urns = self.common.urns();
        let namespace = meta_namespace(&service.metadata);
        let name = meta_name(&service.metadata);
        let spec = service.spec.clone().unwrap_or_default();
        let ports: Vec<i32> = spec
            .ports
            .iter()
            .flatten()
            .map(|p| p.port)
            .filter(|p| *p != 0)
            .collect();

        let mut identifiers = Vec::new();
        if let Some(external_name) = spec
            .external_name
            .as_deref()
            .filter(|n| !n.is_empty() && *n != "None")
        {
            identifiers.push(format!("urn:endpoint:/{}", external_name));
            for port in &ports {
                identifiers.push(urns.endpoint_external_id(&format!("{}:{}", external_name, port)));
            }

            match self.resolver.resolve(external_name).await {
                Ok(addresses) => {
                    for address in addresses {
                        identifiers.push(urns.endpoint_external_id(&address));
                        for port in &ports {
                            identifiers
                                .push(urns.endpoint_external_id(&format!("{}:{}", address, port)));
                        }
                    }
                }
                Err(e) => warn!(
                    host = %external_name,
                    error = %e,
                    "Could not look up IP addresses for external name"
                ),
            }
        }
        identifiers.push(urns.external_service_identifier(namespace, name));

        let tags = self.common.init_tags(&service.metadata, "ExternalService");
        let mut component = self.common.new_component(
            urns.external_service_external_id(namespace, name),
            ComponentType::ExternalService,
            name,
            &tags,
            identifiers,
        );
        put_legacy_meta(&mut component.data, &service.metadata, "ExternalService");
        component
    }

    async fn publish_endpoints(
        &self,
        service_id: &str,
        endpoints: Option<&Endpoints>,
    ) -> CollectorResult<()> {
        let subsets = endpoints.and_then(|e| e.subsets.as_ref());
        for subset in subsets.into_iter().flatten() {
            let ports = subset.ports.as_deref().unwrap_or_default();
            for address in subset.addresses.iter().flatten() {
                let ref_external_id = address
                    .target_ref
                    .as_ref()
                    .filter(|r| r.kind.as_deref() == Some("Pod"))
                    .and_then(|r| {
                        Some(self.common.urns().pod_external_id(
                            r.namespace.as_deref()?,
                            r.name.as_deref()?,
                        ))
                    })
                    .unwrap_or_default();

                for port in ports {
                    send_or_cancel(
                        &self.endpoints,
                        ServiceEndpointCorrelation {
                            service_external_id: service_id.to_string(),
                            endpoint: EndpointId {
                                url: format!("{}:{}", address.ip, port.port),
                                ref_external_id: ref_external_id.clone(),
                            },
                        },
                        self.common.cancellation(),
                        "service endpoint",
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterTopologyCollector for ServiceCollector {
    fn name(&self) -> &'static str {
        "service-collector"
    }

    async fn collect(&mut self) -> CollectorResult<()> {
        let client = self.common.api_client();
        let endpoints: HashMap<(String, String), Endpoints> =
            if self.common.config().resources.endpoints {
                client
                    .get_endpoints()
                    .await
                    .map_err(|e| CollectorError::api("endpoints", e))?
                    .into_iter()
                    .map(|e| {
                        let key = (
                            meta_namespace(&e.metadata).to_string(),
                            meta_name(&e.metadata).to_string(),
                        );
                        (key, e)
                    })
                    .collect()
            } else {
                HashMap::new()
            };

        let services = client
            .get_services()
            .await
            .map_err(|e| CollectorError::api("services", e))?;

        for service in services {
            let namespace = meta_namespace(&service.metadata);
            let name = meta_name(&service.metadata);
            let component = self.service_component(&service);
            let service_id = component.external_id.clone();
            self.common.submit_component(component).await?;

            let spec = service.spec.as_ref();
            if spec.and_then(|s| s.type_.as_deref()) == Some(EXTERNAL_NAME) {
                let external = self.external_service_component(&service).await;
                let external_id = external.external_id.clone();
                self.common.submit_component(external).await?;
                self.common
                    .submit_relation(self.common.create_relation(
                        &service_id,
                        &external_id,
                        RelationType::Uses,
                    ))
                    .await?;
            }

            self.common
                .submit_namespace_relation(namespace, &service_id)
                .await?;

            send_or_cancel(
                &self.selectors,
                ServiceSelectorCorrelation {
                    service_external_id: service_id.clone(),
                    namespace: namespace.to_string(),
                    selector: spec.and_then(|s| s.selector.clone()).unwrap_or_default(),
                },
                self.common.cancellation(),
                "service selector",
            )
            .await?;

            self.publish_endpoints(
                &service_id,
                endpoints.get(&(namespace.to_string(), name.to_string())),
            )
            .await?;
        }

        Ok(())
    }
}
