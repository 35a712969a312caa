use super::{meta_name, send_or_cancel, ClusterTopologyCollector, ClusterTopologyCommon};
use crate::correlator::NodeIdentifierCorrelation;
use crate::error::{CollectorError, CollectorResult};
use crate::models::{ComponentType, Data, DataExt, RelationType};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

pub struct NodeCollector {
    common: ClusterTopologyCommon,
    node_identifiers: mpsc::Sender<NodeIdentifierCorrelation>,
}

impl NodeCollector {
    pub fn new(
        common: ClusterTopologyCommon,
        node_identifiers: mpsc::Sender<NodeIdentifierCorrelation>,
    ) -> Self {
        Self {
            common,
            node_identifiers,
        }
    }
}

#[async_trait]
impl ClusterTopologyCollector for NodeCollector {
    fn name(&self) -> &'static str {
        "node-collector"
    }

    async fn collect(&mut self) -> CollectorResult<()> {
        let nodes = self
            .common
            .api_client()
            .get_nodes()
            .await
            .map_err(|e| CollectorError::api("nodes", e))?;

        let cluster_id = self.common.urns().cluster_external_id();
        for node in nodes {
            let name = meta_name(&node.metadata).to_string();
            let external_id = self.common.urns().node_external_id(&name);
            let instance_id = self.common.urns().node_instance_id(&node);
            let identifiers = self.common.urns().node_urns(&node);
            debug!(node = %name, identifiers = ?identifiers, "Created node identifiers");

            let tags = self.common.init_tags(&node.metadata, "Node");
            let mut component = self.common.new_component(
                external_id.clone(),
                ComponentType::Node,
                &name,
                &tags,
                identifiers,
            );
            // kept in data alongside source properties
            component
                .data
                .insert("instanceId".to_string(), Value::String(instance_id.clone()));
            component
                .data
                .insert("sts_host".to_string(), Value::String(instance_id.clone()));

            if !self
                .common
                .attach_object(&mut component, &node, &node.metadata, "Node")
            {
                component.data.put_non_empty("status", legacy_node_status(&node));
            }

            self.common.submit_component(component).await?;
            self.common
                .submit_relation(self.common.create_relation(
                    &external_id,
                    &cluster_id,
                    RelationType::BelongsTo,
                ))
                .await?;

            send_or_cancel(
                &self.node_identifiers,
                NodeIdentifierCorrelation {
                    node_name: name,
                    instance_id,
                    node_external_id: external_id,
                },
                self.common.cancellation(),
                "node identifier",
            )
            .await?;
        }

        Ok(())
    }
}

fn legacy_node_status(node: &Node) -> Data {
    let mut status = Data::new();
    if let Some(node_status) = node.status.as_ref() {
        status.put_non_empty("phase", &node_status.phase);
        status.put_non_empty("nodeInfo", &node_status.node_info);
        status.put_non_empty(
            "kubeletEndpoint",
            node_status
                .daemon_endpoints
                .as_ref()
                .and_then(|d| d.kubelet_endpoint.as_ref()),
        );
    }
    status
}
