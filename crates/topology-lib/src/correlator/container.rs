use super::{
    container_id_suffix, drain, ClusterTopologyCorrelator, ContainerCorrelation, ContainerPod,
    NodeIdentifierCorrelation,
};
use crate::collector::ClusterTopologyCommon;
use crate::error::CollectorResult;
use crate::models::{Component, ComponentType, RelationType};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ContainerStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
struct ContainerPorts {
    host_port: i32,
    container_port: i32,
}

/// Joins container statuses with the node their pod runs on
pub struct ContainerCorrelator {
    common: ClusterTopologyCommon,
    node_identifiers: mpsc::Receiver<NodeIdentifierCorrelation>,
    containers: mpsc::Receiver<ContainerCorrelation>,
}

impl ContainerCorrelator {
    pub fn new(
        common: ClusterTopologyCommon,
        node_identifiers: mpsc::Receiver<NodeIdentifierCorrelation>,
        containers: mpsc::Receiver<ContainerCorrelation>,
    ) -> Self {
        Self {
            common,
            node_identifiers,
            containers,
        }
    }

    fn container_component(
        &self,
        instance_id: &str,
        pod: &ContainerPod,
        status: &ContainerStatus,
        ports: ContainerPorts,
    ) -> Component {
        let container_id = container_id_suffix(status.container_id.as_deref().unwrap_or_default());
        let identifiers = if container_id.is_empty() {
            Vec::new()
        } else {
            vec![self
                .common
                .urns()
                .container_identifier(instance_id, container_id)]
        };

        let meta = ObjectMeta {
            namespace: Some(pod.namespace.clone()),
            ..Default::default()
        };
        let tags = self.common.init_tags(&meta, "container");
        let mut component = self.common.new_component(
            self.common
                .urns()
                .container_external_id(&pod.namespace, &pod.name, &status.name),
            ComponentType::Container,
            &status.name,
            &tags,
            identifiers,
        );

        let data = &mut component.data;
        data.insert(
            "docker".to_string(),
            json!({
                "image": status.image,
                "imageId": status.image_id,
                "containerId": container_id,
            }),
        );
        data.insert("pod".to_string(), Value::String(pod.name.clone()));
        data.insert("podIP".to_string(), Value::String(pod.pod_ip.clone()));
        data.insert("podPhase".to_string(), Value::String(pod.phase.clone()));
        data.insert("restartCount".to_string(), json!(status.restart_count));

        let state = status.state.as_ref();
        if let Some(started_at) = state
            .and_then(|s| s.running.as_ref())
            .and_then(|r| r.started_at.as_ref())
        {
            data.insert("startTime".to_string(), json!(started_at));
        }

        let exit_code = state
            .and_then(|s| s.terminated.as_ref())
            .or_else(|| {
                status
                    .last_state
                    .as_ref()
                    .and_then(|s| s.terminated.as_ref())
            })
            .map(|t| t.exit_code);
        if let Some(exit_code) = exit_code {
            data.insert("exitCode".to_string(), json!(exit_code));
        }

        if ports.container_port != 0 {
            data.insert("containerPort".to_string(), json!(ports.container_port));
        }
        if ports.host_port != 0 {
            data.insert("hostPort".to_string(), json!(ports.host_port));
        }

        component
    }
}

#[async_trait]
impl ClusterTopologyCorrelator for ContainerCorrelator {
    fn name(&self) -> &'static str {
        "container-correlator"
    }

    async fn correlate(&mut self) -> CollectorResult<()> {
        let (nodes, correlations) =
            tokio::join!(drain(&mut self.node_identifiers), drain(&mut self.containers));

        let node_map: HashMap<String, NodeIdentifierCorrelation> = nodes
            .into_iter()
            .map(|n| (n.node_name.clone(), n))
            .collect();

        for correlation in correlations {
            let pod = &correlation.pod;
            let Some(node) = node_map.get(&pod.node_name) else {
                debug!(
                    pod = %pod.external_id,
                    node = %pod.node_name,
                    "Pod node not collected, skipping its containers"
                );
                continue;
            };

            let mut ports_by_image_and_name = HashMap::new();
            for container in &correlation.containers {
                let image = container.image.as_deref().unwrap_or_default();
                for port in container.ports.iter().flatten() {
                    ports_by_image_and_name.insert(
                        format!("{}_{}", image, container.name),
                        ContainerPorts {
                            host_port: port.host_port.unwrap_or(0),
                            container_port: port.container_port,
                        },
                    );
                }
            }

            for status in &correlation.container_statuses {
                let ports = ports_by_image_and_name
                    .get(&format!("{}_{}", status.image, status.name))
                    .copied()
                    .unwrap_or_default();

                let component = self.container_component(&node.instance_id, pod, status, ports);
                let container_id = component.external_id.clone();
                self.common.submit_component(component).await?;
                self.common
                    .submit_relation(self.common.create_relation(
                        &pod.external_id,
                        &container_id,
                        RelationType::Encloses,
                    ))
                    .await?;
                self.common
                    .submit_relation(self.common.create_relation(
                        &container_id,
                        &node.node_external_id,
                        RelationType::RunsOn,
                    ))
                    .await?;
            }
        }

        Ok(())
    }
}
