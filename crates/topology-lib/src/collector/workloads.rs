//! Controller workloads: Deployments, DaemonSets, StatefulSets and ReplicaSets
//!
//! The four kinds share one collector loop; [`Workload`] supplies the parts
//! that differ per kind.

use super::{
    meta_name, meta_namespace, owner_references, ClusterTopologyCollector, ClusterTopologyCommon,
};
use crate::client::ApiCollectorClient;
use crate::error::{CollectorError, CollectorResult};
use crate::models::{ComponentType, Data, DataExt, RelationType};
use crate::urn::UrnBuilder;
use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use std::marker::PhantomData;

/// A controller kind collected by [`WorkloadCollector`]
#[async_trait]
pub trait Workload: Serialize + Send + Sync + Sized + 'static {
    const COLLECTOR_NAME: &'static str;
    const KIND: &'static str;
    /// Resource name used in API errors
    const RESOURCE: &'static str;
    const COMPONENT_TYPE: ComponentType;

    fn metadata(&self) -> &ObjectMeta;

    fn external_id(urns: &UrnBuilder, namespace: &str, name: &str) -> String;

    /// Fields added to `data` when source properties are disabled
    fn legacy_fields(&self, data: &mut Data);

    async fn list(client: &dyn ApiCollectorClient) -> Result<Vec<Self>>;

    /// A controlling parent replacing the namespace relation
    fn parent(&self, _urns: &UrnBuilder) -> Option<(String, RelationType)> {
        None
    }
}

pub type DeploymentCollector = WorkloadCollector<Deployment>;
pub type DaemonSetCollector = WorkloadCollector<DaemonSet>;
pub type StatefulSetCollector = WorkloadCollector<StatefulSet>;
pub type ReplicaSetCollector = WorkloadCollector<ReplicaSet>;

pub struct WorkloadCollector<W> {
    common: ClusterTopologyCommon,
    _kind: PhantomData<fn() -> W>,
}

impl<W: Workload> WorkloadCollector<W> {
    pub fn new(common: ClusterTopologyCommon) -> Self {
        Self {
            common,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<W: Workload> ClusterTopologyCollector for WorkloadCollector<W> {
    fn name(&self) -> &'static str {
        W::COLLECTOR_NAME
    }

    async fn collect(&mut self) -> CollectorResult<()> {
        let workloads = W::list(self.common.api_client())
            .await
            .map_err(|e| CollectorError::api(W::RESOURCE, e))?;

        for workload in workloads {
            let meta = workload.metadata();
            let namespace = meta_namespace(meta);
            let name = meta_name(meta);
            let external_id = W::external_id(self.common.urns(), namespace, name);

            let tags = self.common.init_tags(meta, W::KIND);
            let mut component = self.common.new_component(
                external_id.clone(),
                W::COMPONENT_TYPE,
                name,
                &tags,
                Vec::new(),
            );
            if !self
                .common
                .attach_object(&mut component, &workload, meta, W::KIND)
            {
                workload.legacy_fields(&mut component.data);
            }
            self.common.submit_component(component).await?;

            match workload.parent(self.common.urns()) {
                Some((parent_id, relation_type)) => {
                    self.common
                        .submit_relation(self.common.create_relation(
                            &parent_id,
                            &external_id,
                            relation_type,
                        ))
                        .await?
                }
                None => {
                    self.common
                        .submit_namespace_relation(namespace, &external_id)
                        .await?
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Workload for Deployment {
    const COLLECTOR_NAME: &'static str = "deployment-collector";
    const KIND: &'static str = "Deployment";
    const RESOURCE: &'static str = "deployments";
    const COMPONENT_TYPE: ComponentType = ComponentType::Deployment;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn external_id(urns: &UrnBuilder, namespace: &str, name: &str) -> String {
        urns.deployment_external_id(namespace, name)
    }

    fn legacy_fields(&self, data: &mut Data) {
        let spec = self.spec.as_ref();
        data.put_non_empty(
            "deploymentStrategy",
            spec.and_then(|s| s.strategy.as_ref()).and_then(|s| s.type_.as_ref()),
        );
        data.put_non_empty("desiredReplicas", spec.and_then(|s| s.replicas));
    }

    async fn list(client: &dyn ApiCollectorClient) -> Result<Vec<Self>> {
        client.get_deployments().await
    }
}

#[async_trait]
impl Workload for DaemonSet {
    const COLLECTOR_NAME: &'static str = "daemonset-collector";
    const KIND: &'static str = "DaemonSet";
    const RESOURCE: &'static str = "daemonsets";
    const COMPONENT_TYPE: ComponentType = ComponentType::DaemonSet;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn external_id(urns: &UrnBuilder, namespace: &str, name: &str) -> String {
        urns.daemonset_external_id(namespace, name)
    }

    fn legacy_fields(&self, data: &mut Data) {
        data.put_non_empty(
            "updateStrategy",
            self.spec
                .as_ref()
                .and_then(|s| s.update_strategy.as_ref())
                .and_then(|s| s.type_.as_ref()),
        );
    }

    async fn list(client: &dyn ApiCollectorClient) -> Result<Vec<Self>> {
        client.get_daemon_sets().await
    }
}

#[async_trait]
impl Workload for StatefulSet {
    const COLLECTOR_NAME: &'static str = "statefulset-collector";
    const KIND: &'static str = "StatefulSet";
    const RESOURCE: &'static str = "statefulsets";
    const COMPONENT_TYPE: ComponentType = ComponentType::StatefulSet;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn external_id(urns: &UrnBuilder, namespace: &str, name: &str) -> String {
        urns.statefulset_external_id(namespace, name)
    }

    fn legacy_fields(&self, data: &mut Data) {
        let Some(spec) = self.spec.as_ref() else { return };
        data.put_non_empty(
            "updateStrategy",
            spec.update_strategy.as_ref().and_then(|s| s.type_.as_ref()),
        );
        data.put_non_empty("desiredReplicas", spec.replicas);
        data.put_non_empty("podManagementPolicy", &spec.pod_management_policy);
        data.put_non_empty("serviceName", &spec.service_name);
    }

    async fn list(client: &dyn ApiCollectorClient) -> Result<Vec<Self>> {
        client.get_stateful_sets().await
    }
}

#[async_trait]
impl Workload for ReplicaSet {
    const COLLECTOR_NAME: &'static str = "replicaset-collector";
    const KIND: &'static str = "ReplicaSet";
    const RESOURCE: &'static str = "replicasets";
    const COMPONENT_TYPE: ComponentType = ComponentType::ReplicaSet;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn external_id(urns: &UrnBuilder, namespace: &str, name: &str) -> String {
        urns.replicaset_external_id(namespace, name)
    }

    fn legacy_fields(&self, data: &mut Data) {
        data.put_non_empty("desiredReplicas", self.spec.as_ref().and_then(|s| s.replicas));
    }

    async fn list(client: &dyn ApiCollectorClient) -> Result<Vec<Self>> {
        client.get_replica_sets().await
    }

    fn parent(&self, urns: &UrnBuilder) -> Option<(String, RelationType)> {
        let namespace = meta_namespace(&self.metadata);
        owner_references(&self.metadata)
            .iter()
            .find(|owner| owner.kind == "Deployment")
            .map(|owner| {
                (
                    urns.deployment_external_id(namespace, &owner.name),
                    RelationType::Controls,
                )
            })
    }
}
