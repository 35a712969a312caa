//! Rendering of Kubernetes objects into component source properties

use crate::models::Data;
use crate::sanitize::LAST_APPLIED_CONFIG_ANNOTATION;
use k8s_openapi::api::core::v1::PodStatus;
use serde::Serialize;
use serde_json::Value;

/// Status fields that survive on Pods and Nodes when status is hidden
const STATUS_WHITELIST: [&str; 4] = ["phase", "nodeInfo", "daemonEndpoints", "message"];

/// Kinds that keep a trimmed status when status exposure is off
const STATUS_KEEPING_KINDS: [&str; 2] = ["Pod", "Node"];

/// Serialize `object` and strip the fields that must not reach the store.
///
/// Never fails: a marshal error is reported inside the returned payload.
pub fn render<T: Serialize>(object: &T, expose_status: bool) -> Data {
    let mut map = match serde_json::to_value(object) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            let mut map = Data::new();
            map.insert("value".to_string(), other);
            return map;
        }
        Err(e) => return serialization_error(&e.to_string()),
    };

    if let Some(Value::Object(metadata)) = map.get_mut("metadata") {
        metadata.remove("managedFields");

        if !expose_status {
            metadata.remove("resourceVersion");
            if let Some(Value::Object(annotations)) = metadata.get_mut("annotations") {
                annotations.remove(LAST_APPLIED_CONFIG_ANNOTATION);
                if annotations.is_empty() {
                    metadata.remove("annotations");
                }
            }
        }
    }

    if !expose_status {
        let keeps_status = map
            .get("kind")
            .and_then(Value::as_str)
            .map(|kind| STATUS_KEEPING_KINDS.contains(&kind))
            .unwrap_or(false);

        match map.remove("status") {
            Some(Value::Object(status)) if keeps_status => {
                let trimmed: Data = status
                    .into_iter()
                    .filter(|(key, _)| STATUS_WHITELIST.contains(&key.as_str()))
                    .collect();
                map.insert("status".to_string(), Value::Object(trimmed));
            }
            _ => {}
        }
    }

    map
}

/// Payload used in place of an object that could not be serialized
pub fn serialization_error(message: &str) -> Data {
    let mut map = Data::new();
    map.insert(
        "serialization_error".to_string(),
        Value::String(message.to_string()),
    );
    map
}

/// Pod status as carried in legacy data: per-container detail removed
pub fn prune_pod_status(status: &PodStatus) -> PodStatus {
    PodStatus {
        conditions: None,
        init_container_statuses: None,
        container_statuses: None,
        ephemeral_container_statuses: None,
        ..status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ConfigMap, ContainerStatus, Node, NodeStatus, NodeSystemInfo, Pod, PodCondition,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ManagedFieldsEntry, ObjectMeta};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn meta() -> ObjectMeta {
        ObjectMeta {
            name: Some("web".to_string()),
            namespace: Some("default".to_string()),
            resource_version: Some("42".to_string()),
            managed_fields: Some(vec![ManagedFieldsEntry {
                manager: Some("kubectl".to_string()),
                ..Default::default()
            }]),
            annotations: Some(BTreeMap::from([
                (LAST_APPLIED_CONFIG_ANNOTATION.to_string(), "{}".to_string()),
                ("owner".to_string(), "team-a".to_string()),
            ])),
            ..Default::default()
        }
    }

    fn pod() -> Pod {
        Pod {
            metadata: meta(),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                message: Some("ok".to_string()),
                pod_ip: Some("10.0.0.1".to_string()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_hidden_status_keeps_pod_whitelist() {
        let rendered = render(&pod(), false);

        assert_eq!(rendered["kind"], json!("Pod"));
        assert_eq!(rendered["apiVersion"], json!("v1"));
        assert_eq!(
            rendered["status"],
            json!({"phase": "Running", "message": "ok"})
        );
        let metadata = rendered["metadata"].as_object().unwrap();
        assert!(!metadata.contains_key("managedFields"));
        assert!(!metadata.contains_key("resourceVersion"));
        assert_eq!(metadata["annotations"], json!({"owner": "team-a"}));
    }

    #[test]
    fn test_exposed_status_only_drops_managed_fields() {
        let rendered = render(&pod(), true);

        let metadata = rendered["metadata"].as_object().unwrap();
        assert!(!metadata.contains_key("managedFields"));
        assert_eq!(metadata["resourceVersion"], json!("42"));
        assert!(metadata["annotations"]
            .as_object()
            .unwrap()
            .contains_key(LAST_APPLIED_CONFIG_ANNOTATION));
        assert_eq!(rendered["status"]["podIP"], json!("10.0.0.1"));
        assert!(rendered["status"]["conditions"].is_array());
    }

    #[test]
    fn test_node_keeps_node_info() {
        let node = Node {
            metadata: meta(),
            status: Some(NodeStatus {
                node_info: Some(NodeSystemInfo {
                    kubelet_version: "v1.28.2".to_string(),
                    ..Default::default()
                }),
                capacity: Some(BTreeMap::new()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let rendered = render(&node, false);
        let status = rendered["status"].as_object().unwrap();
        assert_eq!(status["nodeInfo"]["kubeletVersion"], json!("v1.28.2"));
        assert!(!status.contains_key("capacity"));
    }

    #[test]
    fn test_other_kinds_lose_status_entirely() {
        let configmap = ConfigMap {
            metadata: meta(),
            data: Some(BTreeMap::from([("k".to_string(), "v".to_string())])),
            ..Default::default()
        };

        let rendered = render(&configmap, false);
        assert!(!rendered.contains_key("status"));
        assert_eq!(rendered["data"], json!({"k": "v"}));
    }

    #[test]
    fn test_annotations_removed_when_only_last_applied() {
        let mut configmap = ConfigMap {
            metadata: meta(),
            ..Default::default()
        };
        configmap.metadata.annotations = Some(BTreeMap::from([(
            LAST_APPLIED_CONFIG_ANNOTATION.to_string(),
            "{}".to_string(),
        )]));

        let rendered = render(&configmap, false);
        assert!(!rendered["metadata"]
            .as_object()
            .unwrap()
            .contains_key("annotations"));
    }

    #[test]
    fn test_serialization_error_payload() {
        struct Broken;
        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("boom"))
            }
        }

        let rendered = render(&Broken, false);
        assert_eq!(rendered["serialization_error"], json!("boom"));
    }

    #[test]
    fn test_prune_pod_status() {
        let mut status = pod().status.unwrap();
        status.container_statuses = Some(vec![ContainerStatus::default()]);

        let pruned = prune_pod_status(&status);
        assert!(pruned.conditions.is_none());
        assert!(pruned.container_statuses.is_none());
        assert_eq!(pruned.phase.as_deref(), Some("Running"));
        assert_eq!(pruned.pod_ip.as_deref(), Some("10.0.0.1"));
    }
}
