//! Per-kind topology collectors
//!
//! Each collector lists one kind from the API server, turns every object into
//! a component and submits the relations it can infer locally. Cross-object
//! joins are left to the correlators, fed through dedicated channels that a
//! collector closes by dropping its senders when it finishes.

mod cluster;
mod common;
mod configmap;
mod cronjob;
mod ingress;
mod job;
mod namespace;
mod node;
mod persistent_volume;
mod pod;
mod relation_cache;
mod secret;
mod service;
mod workloads;


pub use cluster::ClusterCollector;
pub use common::{
    meta_name, meta_namespace, owner_references, put_legacy_meta, ClusterTopologyCommon, Tags,
    TopologySink,
};
pub use configmap::ConfigMapCollector;
pub use cronjob::CronJobCollector;
pub use ingress::IngressCollector;
pub use job::JobCollector;
pub use namespace::NamespaceCollector;
pub use node::NodeCollector;
pub use persistent_volume::PersistentVolumeCollector;
pub use pod::{PodCollector, PodCorrelationSenders};
pub use relation_cache::RelationCache;
pub use secret::SecretCollector;
pub use service::ServiceCollector;
pub use workloads::{
    DaemonSetCollector, DeploymentCollector, ReplicaSetCollector, StatefulSetCollector, Workload,
    WorkloadCollector,
};

pub(crate) use common::send_or_cancel;

use crate::error::CollectorResult;
use async_trait::async_trait;

/// A worker that turns one Kubernetes kind into topology
#[async_trait]
pub trait ClusterTopologyCollector: Send {
    fn name(&self) -> &'static str;

    async fn collect(&mut self) -> CollectorResult<()>;
}
