//! Cross-object correlators
//!
//! Correlators consume the messages published by the collectors on dedicated
//! channels. A channel is closed when its producing collector finishes, so a
//! correlator drains all of its inputs before joining them.

mod container;
mod service2pod;
mod volume;
mod volume_mappers;

pub use container::ContainerCorrelator;
pub use service2pod::{Service2PodCorrelator, Service2PodReceivers};
pub use volume::VolumeCorrelator;
pub use volume_mappers::{
    map_persistent_volume, map_pod_volume, K8sVolume, K8sVolumeSource, MappedVolume,
    PodVolumeContext, VolumeTarget, VOLUME_API_VERSION,
};

use crate::collector::Tags;
use crate::error::CollectorResult;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, ContainerStatus, Volume};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// A worker joining the output of several collectors
#[async_trait]
pub trait ClusterTopologyCorrelator: Send {
    fn name(&self) -> &'static str;

    async fn correlate(&mut self) -> CollectorResult<()>;
}

/// Published by the node collector for every node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeIdentifierCorrelation {
    pub node_name: String,
    pub instance_id: String,
    pub node_external_id: String,
}

/// The pod side of a container correlation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerPod {
    pub external_id: String,
    pub name: String,
    pub labels: Tags,
    pub pod_ip: String,
    pub namespace: String,
    pub node_name: String,
    pub phase: String,
}

/// Published by the pod collector for pods with container statuses
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerCorrelation {
    pub pod: ContainerPod,
    pub containers: Vec<Container>,
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PodIdentifier {
    pub external_id: String,
    pub namespace: String,
    pub name: String,
    pub node_name: String,
    pub creation_time: Option<Time>,
}

/// Published by the pod collector for pods with volumes
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeCorrelation {
    pub pod: PodIdentifier,
    pub volumes: Vec<Volume>,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointId {
    /// `address:port`
    pub url: String,
    pub ref_external_id: String,
}

/// One endpoint address and port behind a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpointCorrelation {
    pub service_external_id: String,
    pub endpoint: EndpointId,
}

/// A `hostIP:containerPort` served by a host network pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodEndpointCorrelation {
    pub host_endpoint: String,
    pub namespace: String,
    pub pod_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodLabelCorrelation {
    pub labels: BTreeMap<String, String>,
    pub namespace: String,
    pub pod_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSelectorCorrelation {
    pub service_external_id: String,
    pub namespace: String,
    pub selector: BTreeMap<String, String>,
}

/// Drain a correlation channel until its producer closes it
pub(crate) async fn drain<T>(rx: &mut mpsc::Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item);
    }
    items
}

/// Last path segment of a runtime container id such as `containerd://abc`
pub(crate) fn container_id_suffix(container_id: &str) -> &str {
    container_id.rsplit('/').next().unwrap_or(container_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_suffix() {
        assert_eq!(container_id_suffix("containerd://0a1b2c"), "0a1b2c");
        assert_eq!(container_id_suffix("docker://deadbeef"), "deadbeef");
        assert_eq!(container_id_suffix("plain"), "plain");
        assert_eq!(container_id_suffix(""), "");
    }

    #[tokio::test]
    async fn test_drain_returns_everything_after_close() {
        let (tx, mut rx) = mpsc::channel(4);
        let producer = tokio::spawn(async move {
            for i in 0..10u32 {
                tx.send(i).await.unwrap();
            }
        });

        let items = drain(&mut rx).await;
        producer.await.unwrap();
        assert_eq!(items, (0..10).collect::<Vec<_>>());
    }
}
