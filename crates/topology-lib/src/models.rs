//! Core data models for the topology graph

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Free-form payload carried by components and relations
pub type Data = Map<String, Value>;

/// Helpers for building component payloads
pub trait DataExt {
    /// Insert `value` under `key` unless it serializes to null, an empty
    /// string, an empty list or an empty object
    fn put_non_empty<T: Serialize>(&mut self, key: &str, value: T);
}

impl DataExt for Data {
    fn put_non_empty<T: Serialize>(&mut self, key: &str, value: T) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(_) => return,
        };
        let empty = match &value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        };
        if !empty {
            self.insert(key.to_string(), value);
        }
    }
}

/// The kind of cluster being observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    #[default]
    Kubernetes,
    OpenShift,
}

impl ClusterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::Kubernetes => "kubernetes",
            ClusterType::OpenShift => "openshift",
        }
    }

    /// Anything that is not `openshift` is treated as plain Kubernetes
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("openshift") {
            ClusterType::OpenShift
        } else {
            ClusterType::Kubernetes
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the cluster a run belongs to.
///
/// `url` is the human cluster name and the ground truth for every URN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInstance {
    #[serde(rename = "type")]
    pub instance_type: String,
    pub url: String,
}

impl ClusterInstance {
    pub fn new(cluster_type: ClusterType, url: impl Into<String>) -> Self {
        Self {
            instance_type: cluster_type.as_str().to_string(),
            url: url.into(),
        }
    }

    pub fn cluster_type(&self) -> ClusterType {
        ClusterType::from_str_lossy(&self.instance_type)
    }

    pub fn is_complete(&self) -> bool {
        !self.instance_type.is_empty() && !self.url.is_empty()
    }
}

/// Closed set of component types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    #[serde(rename = "cluster")]
    Cluster,
    #[serde(rename = "namespace")]
    Namespace,
    #[serde(rename = "node")]
    Node,
    #[serde(rename = "pod")]
    Pod,
    #[serde(rename = "container")]
    Container,
    #[serde(rename = "service")]
    Service,
    #[serde(rename = "external-service")]
    ExternalService,
    #[serde(rename = "endpoint")]
    Endpoint,
    #[serde(rename = "ingress")]
    Ingress,
    #[serde(rename = "deployment")]
    Deployment,
    #[serde(rename = "replicaset")]
    ReplicaSet,
    #[serde(rename = "statefulset")]
    StatefulSet,
    #[serde(rename = "daemonset")]
    DaemonSet,
    #[serde(rename = "job")]
    Job,
    #[serde(rename = "cronjob")]
    CronJob,
    #[serde(rename = "configmap")]
    ConfigMap,
    #[serde(rename = "secret")]
    Secret,
    #[serde(rename = "persistent-volume")]
    PersistentVolume,
    #[serde(rename = "persistent-volume-claim")]
    PersistentVolumeClaim,
    #[serde(rename = "volume")]
    Volume,
    #[serde(rename = "volume-source")]
    VolumeSource,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Cluster => "cluster",
            ComponentType::Namespace => "namespace",
            ComponentType::Node => "node",
            ComponentType::Pod => "pod",
            ComponentType::Container => "container",
            ComponentType::Service => "service",
            ComponentType::ExternalService => "external-service",
            ComponentType::Endpoint => "endpoint",
            ComponentType::Ingress => "ingress",
            ComponentType::Deployment => "deployment",
            ComponentType::ReplicaSet => "replicaset",
            ComponentType::StatefulSet => "statefulset",
            ComponentType::DaemonSet => "daemonset",
            ComponentType::Job => "job",
            ComponentType::CronJob => "cronjob",
            ComponentType::ConfigMap => "configmap",
            ComponentType::Secret => "secret",
            ComponentType::PersistentVolume => "persistent-volume",
            ComponentType::PersistentVolumeClaim => "persistent-volume-claim",
            ComponentType::Volume => "volume",
            ComponentType::VolumeSource => "volume-source",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of relation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    BelongsTo,
    Encloses,
    Controls,
    Creates,
    ScheduledOn,
    RunsOn,
    Claims,
    Mounts,
    Exposes,
    Routes,
    Uses,
    UsesValue,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::BelongsTo => "belongs_to",
            RelationType::Encloses => "encloses",
            RelationType::Controls => "controls",
            RelationType::Creates => "creates",
            RelationType::ScheduledOn => "scheduled_on",
            RelationType::RunsOn => "runs_on",
            RelationType::Claims => "claims",
            RelationType::Mounts => "mounts",
            RelationType::Exposes => "exposes",
            RelationType::Routes => "routes",
            RelationType::Uses => "uses",
            RelationType::UsesValue => "uses_value",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the emitted topology graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(rename = "externalID")]
    pub external_id: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub data: Data,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_properties: Option<Data>,
}

impl Component {
    pub fn new(external_id: impl Into<String>, component_type: ComponentType, data: Data) -> Self {
        Self {
            external_id: external_id.into(),
            component_type,
            data,
            source_properties: None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.data.get("name").and_then(Value::as_str)
    }

    /// Secondary URNs in emission order
    pub fn identifiers(&self) -> Vec<&str> {
        self.data
            .get("identifiers")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.data
            .get("tags")
            .and_then(|tags| tags.get(key))
            .and_then(Value::as_str)
    }
}

/// A directed, typed edge between two components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(rename = "externalID")]
    pub external_id: String,
    #[serde(rename = "sourceID")]
    pub source_id: String,
    #[serde(rename = "targetID")]
    pub target_id: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub data: Data,
}

impl Relation {
    pub fn new(source_id: &str, target_id: &str, relation_type: RelationType) -> Self {
        Self::with_data(source_id, target_id, relation_type, Data::new())
    }

    pub fn with_data(
        source_id: &str,
        target_id: &str,
        relation_type: RelationType,
        data: Data,
    ) -> Self {
        Self {
            external_id: format!("{}->{}", source_id, target_id),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation_type,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_non_empty_skips_empty_values() {
        let mut data = Data::new();
        data.put_non_empty("empty", "");
        data.put_non_empty("none", Option::<String>::None);
        data.put_non_empty("list", Vec::<String>::new());
        data.put_non_empty("zero", 0);
        data.put_non_empty("name", "web");

        assert!(!data.contains_key("empty"));
        assert!(!data.contains_key("none"));
        assert!(!data.contains_key("list"));
        assert_eq!(data["zero"], json!(0));
        assert_eq!(data["name"], json!("web"));
    }

    #[test]
    fn test_relation_external_id() {
        let relation = Relation::new("a", "b", RelationType::UsesValue);
        assert_eq!(relation.external_id, "a->b");

        let json = serde_json::to_value(&relation).unwrap();
        assert_eq!(json["type"], "uses_value");
        assert_eq!(json["sourceID"], "a");
    }

    #[test]
    fn test_component_type_serialization_matches_display() {
        for ty in [
            ComponentType::ExternalService,
            ComponentType::ReplicaSet,
            ComponentType::PersistentVolumeClaim,
            ComponentType::VolumeSource,
        ] {
            let json = serde_json::to_value(ty).unwrap();
            assert_eq!(json, json!(ty.as_str()));
        }
    }

    #[test]
    fn test_cluster_instance_completeness() {
        assert!(ClusterInstance::new(ClusterType::OpenShift, "prod").is_complete());
        assert!(!ClusterInstance::new(ClusterType::Kubernetes, "").is_complete());
        assert_eq!(
            ClusterType::from_str_lossy("OpenShift"),
            ClusterType::OpenShift
        );
        assert_eq!(ClusterType::from_str_lossy("eks"), ClusterType::Kubernetes);
    }
}
