//! Canonical external identifiers for topology components
//!
//! Every component and relation endpoint is addressed by a URN derived from
//! the cluster instance. The grammar is closed: namespaced objects render as
//! `urn:<type>:/<url>:<namespace>:<kind>/<name>`, cluster scoped objects as
//! `urn:<type>:/<url>:<kind>/<name>`.

use crate::models::ClusterInstance;
use k8s_openapi::api::core::v1::Node;
use url::Url;

/// Builds URNs for a single cluster instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrnBuilder {
    cluster_type: String,
    url: String,
    prefix: String,
}

impl UrnBuilder {
    pub fn new(instance: &ClusterInstance) -> Self {
        Self {
            cluster_type: instance.instance_type.clone(),
            url: instance.url.clone(),
            prefix: format!("urn:{}:/{}", instance.instance_type, instance.url),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cluster_external_id(&self) -> String {
        format!("urn:cluster:/{}:{}", self.cluster_type, self.url)
    }

    /// Generic form shared by every namespaced and cluster scoped kind
    pub fn component_external_id(&self, component: &str, namespace: &str, name: &str) -> String {
        if namespace.is_empty() {
            format!("{}:{}/{}", self.prefix, component, name)
        } else {
            format!("{}:{}:{}/{}", self.prefix, namespace, component, name)
        }
    }

    /// Resolve a Kubernetes kind (as found in owner references) to its URN
    pub fn external_id_for_kind(&self, kind: &str, namespace: &str, name: &str) -> Option<String> {
        let urn = match kind {
            "ConfigMap" => self.configmap_external_id(namespace, name),
            "Secret" => self.secret_external_id(namespace, name),
            "Namespace" => self.namespace_external_id(name),
            "DaemonSet" => self.daemonset_external_id(namespace, name),
            "Deployment" => self.deployment_external_id(namespace, name),
            "Node" => self.node_external_id(name),
            "Pod" => self.pod_external_id(namespace, name),
            "ReplicaSet" => self.replicaset_external_id(namespace, name),
            "Service" => self.service_external_id(namespace, name),
            "StatefulSet" => self.statefulset_external_id(namespace, name),
            "CronJob" => self.cronjob_external_id(namespace, name),
            "Job" => self.job_external_id(namespace, name),
            "Ingress" => self.ingress_external_id(namespace, name),
            "PersistentVolume" => self.persistent_volume_external_id(name),
            "PersistentVolumeClaim" => self.persistent_volume_claim_external_id(namespace, name),
            "Endpoint" => self.endpoint_external_id(name),
            _ => return None,
        };
        Some(urn)
    }

    pub fn node_external_id(&self, node_name: &str) -> String {
        format!("{}:node/{}", self.prefix, node_name)
    }

    pub fn namespace_external_id(&self, namespace: &str) -> String {
        self.component_external_id("namespace", "", namespace)
    }

    pub fn pod_external_id(&self, namespace: &str, pod_name: &str) -> String {
        self.component_external_id("pod", namespace, pod_name)
    }

    pub fn container_external_id(&self, namespace: &str, pod_name: &str, container: &str) -> String {
        format!("{}:container/{}", self.pod_external_id(namespace, pod_name), container)
    }

    pub fn service_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("service", namespace, name)
    }

    pub fn external_service_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("external-service", namespace, name)
    }

    pub fn daemonset_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("daemonset", namespace, name)
    }

    pub fn deployment_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("deployment", namespace, name)
    }

    pub fn replicaset_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("replicaset", namespace, name)
    }

    pub fn statefulset_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("statefulset", namespace, name)
    }

    pub fn configmap_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("configmap", namespace, name)
    }

    pub fn secret_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("secret", namespace, name)
    }

    pub fn cronjob_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("cronjob", namespace, name)
    }

    pub fn job_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("job", namespace, name)
    }

    pub fn ingress_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("ingress", namespace, name)
    }

    pub fn volume_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("volume", namespace, name)
    }

    pub fn persistent_volume_external_id(&self, name: &str) -> String {
        self.component_external_id("persistent-volume", "", name)
    }

    pub fn persistent_volume_claim_external_id(&self, namespace: &str, name: &str) -> String {
        self.component_external_id("persistent-volume-claim", namespace, name)
    }

    /// Volumes that live outside the cluster (cloud disks, CSI handles)
    pub fn external_volume_external_id(&self, volume_type: &str, parts: &[&str]) -> String {
        format!(
            "urn:{}:external-volume:{}/{}",
            self.cluster_type,
            volume_type,
            parts.join("/")
        )
    }

    pub fn endpoint_external_id(&self, endpoint: &str) -> String {
        format!("urn:endpoint:/{}:{}", self.url, endpoint)
    }

    pub fn service_identifier(&self, namespace: &str, name: &str) -> String {
        format!("urn:service:/{}:{}:{}", self.url, namespace, name)
    }

    pub fn external_service_identifier(&self, namespace: &str, name: &str) -> String {
        format!("urn:external-service:/{}:{}:{}", self.url, namespace, name)
    }

    pub fn pod_ip_identifier(&self, namespace: &str, pod_name: &str, address: &str) -> String {
        format!("urn:ip:/{}:{}:{}:{}", self.url, namespace, pod_name, address)
    }

    pub fn host_identifier(&self, host: &str) -> String {
        format!("urn:host:/{}", host)
    }

    pub fn container_identifier(&self, instance_id: &str, container_id: &str) -> String {
        if instance_id.is_empty() {
            format!("urn:container:/{}", container_id)
        } else {
            format!("urn:container:/{}:{}", instance_id, container_id)
        }
    }

    /// Host instance id used to merge the node with host level telemetry
    pub fn node_instance_id(&self, node: &Node) -> String {
        let node_name = node.metadata.name.as_deref().unwrap_or_default();
        node.spec
            .as_ref()
            .and_then(|spec| spec.provider_id.as_deref())
            .and_then(aws_instance_id)
            .unwrap_or_else(|| format!("{}-{}", node_name, self.url))
    }

    /// Identifier list merging a node with hosts and IPs seen elsewhere
    pub fn node_urns(&self, node: &Node) -> Vec<String> {
        let node_name = node.metadata.name.as_deref().unwrap_or_default();
        let addresses = node
            .status
            .as_ref()
            .and_then(|status| status.addresses.as_ref())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut identifiers = Vec::with_capacity(addresses.len() + 3);
        for address in addresses {
            match address.type_.as_str() {
                "InternalIP" => identifiers.push(format!(
                    "urn:ip:/{}:{}:{}",
                    self.url, node_name, address.address
                )),
                "ExternalIP" => {
                    identifiers.push(format!("urn:ip:/{}:{}", self.url, address.address))
                }
                "InternalDNS" => {
                    identifiers.push(format!("urn:host:/{}:{}", self.url, address.address))
                }
                "ExternalDNS" => identifiers.push(self.host_identifier(&address.address)),
                _ => continue,
            }
        }

        let provider_id = node
            .spec
            .as_ref()
            .and_then(|spec| spec.provider_id.as_deref())
            .unwrap_or_default();
        if let Some(arn) = provider_id.strip_prefix("azure:///") {
            identifiers.push(format!("urn:azure:/{}", arn));
            // Azure reports upper-cased resource ids
            identifiers.push(format!("urn:azure:/{}", arn.to_uppercase()));
        }

        let instance_id = self.node_instance_id(node);
        if !instance_id.is_empty() {
            identifiers.push(self.host_identifier(&instance_id));
        }

        identifiers
    }
}

/// Extract `i-...` from `aws:///<zone>/i-...`
fn aws_instance_id(provider_id: &str) -> Option<String> {
    let parsed = Url::parse(provider_id).ok()?;
    if parsed.scheme() != "aws" {
        return None;
    }
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .filter(|segment| segment.starts_with("i-"))
        .map(str::to_string)
}
