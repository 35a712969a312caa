//! Services shared by every collector and correlator

use super::relation_cache::RelationCache;
use crate::client::ApiCollectorClient;
use crate::config::TopologyConfig;
use crate::error::{CollectorError, CollectorResult};
use crate::models::{ClusterInstance, Component, ComponentType, Data, DataExt, Relation, RelationType};
use crate::source_properties;
use crate::urn::UrnBuilder;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type Tags = BTreeMap<String, String>;

/// Send on a bounded channel unless the run is stopped first
pub(crate) async fn send_or_cancel<T: Send>(
    tx: &mpsc::Sender<T>,
    item: T,
    cancel: &CancellationToken,
    channel: &'static str,
) -> CollectorResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CollectorError::Cancelled),
        sent = tx.send(item) => sent.map_err(|_| CollectorError::ChannelClosed { channel }),
    }
}

#[derive(Debug, Default)]
struct EmitCounters {
    components: AtomicUsize,
    relations: AtomicUsize,
}

/// Writing half of the component and relation streams
#[derive(Clone)]
pub struct TopologySink {
    components: mpsc::Sender<Component>,
    relations: mpsc::Sender<Relation>,
    cache: Arc<RelationCache>,
    counters: Arc<EmitCounters>,
    cancel: CancellationToken,
}

impl TopologySink {
    pub fn new(
        components: mpsc::Sender<Component>,
        relations: mpsc::Sender<Relation>,
        use_relation_cache: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            components,
            relations,
            cache: Arc::new(RelationCache::new(use_relation_cache)),
            counters: Arc::new(EmitCounters::default()),
            cancel,
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Emit a component; a second component with the same id is skipped
    pub async fn submit_component(&self, component: Component) -> CollectorResult<()> {
        if !self.cache.register_component(&component.external_id) {
            debug!(external_id = %component.external_id, "Skipping duplicate component");
            return Ok(());
        }
        send_or_cancel(&self.components, component, &self.cancel, "component").await?;
        self.counters.components.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Emit a relation now, or defer it until both endpoints are known
    pub async fn submit_relation(&self, relation: Relation) -> CollectorResult<()> {
        match self.cache.admit(relation) {
            Some(relation) => self.forward_relation(relation).await,
            None => Ok(()),
        }
    }

    /// Flush deferred relations whose endpoints appeared; returns how many were dropped
    pub async fn correlate_relations(&self) -> CollectorResult<usize> {
        let (resolved, unresolved) = self.cache.drain_deferred();
        for relation in resolved {
            self.forward_relation(relation).await?;
        }
        for relation in &unresolved {
            debug!(
                source = %relation.source_id,
                target = %relation.target_id,
                "Dropping relation with unknown endpoint"
            );
        }
        if !unresolved.is_empty() {
            warn!(count = unresolved.len(), "Dropped relations with unknown endpoints");
        }
        Ok(unresolved.len())
    }

    pub fn components_emitted(&self) -> usize {
        self.counters.components.load(Ordering::Relaxed)
    }

    pub fn relations_emitted(&self) -> usize {
        self.counters.relations.load(Ordering::Relaxed)
    }

    async fn forward_relation(&self, relation: Relation) -> CollectorResult<()> {
        send_or_cancel(&self.relations, relation, &self.cancel, "relation").await?;
        self.counters.relations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Cluster identity, API access, flags and output, injected into every worker
#[derive(Clone)]
pub struct ClusterTopologyCommon {
    instance: ClusterInstance,
    urns: UrnBuilder,
    client: Arc<dyn ApiCollectorClient>,
    config: Arc<TopologyConfig>,
    sink: TopologySink,
}

impl ClusterTopologyCommon {
    pub fn new(
        client: Arc<dyn ApiCollectorClient>,
        config: Arc<TopologyConfig>,
        sink: TopologySink,
    ) -> Self {
        let instance = config.instance();
        Self {
            urns: UrnBuilder::new(&instance),
            instance,
            client,
            config,
            sink,
        }
    }

    pub fn instance(&self) -> &ClusterInstance {
        &self.instance
    }

    pub fn urns(&self) -> &UrnBuilder {
        &self.urns
    }

    pub fn api_client(&self) -> &dyn ApiCollectorClient {
        self.client.as_ref()
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.sink.cancellation()
    }

    pub fn is_source_properties_enabled(&self) -> bool {
        self.config.source_properties_enabled
    }

    pub fn is_expose_status_enabled(&self) -> bool {
        self.config.expose_kubernetes_status_enabled
    }

    /// Labels plus the cluster, component type and namespace tags
    pub fn init_tags(&self, meta: &ObjectMeta, kind: &str) -> Tags {
        let mut tags = meta.labels.clone().unwrap_or_default();
        tags.insert("cluster-name".to_string(), self.instance.url.clone());
        tags.insert("cluster-type".to_string(), self.instance.instance_type.clone());
        tags.insert(
            "component-type".to_string(),
            format!("{}-{}", self.instance.instance_type, kind.to_lowercase()),
        );
        if let Some(namespace) = meta.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            tags.insert("namespace".to_string(), namespace.to_string());
        }
        tags
    }

    /// Component with `name`, `tags` and `identifiers` filled in
    pub fn new_component(
        &self,
        external_id: String,
        component_type: ComponentType,
        name: &str,
        tags: &Tags,
        identifiers: Vec<String>,
    ) -> Component {
        let mut data = Data::new();
        data.insert("name".to_string(), Value::String(name.to_string()));
        data.insert("tags".to_string(), serde_json::to_value(tags).unwrap_or_default());
        data.insert(
            "identifiers".to_string(),
            Value::Array(identifiers.into_iter().map(Value::String).collect()),
        );
        Component::new(external_id, component_type, data)
    }

    /// Attach source properties, or the legacy metadata fields when disabled.
    ///
    /// Returns true when source properties were attached.
    pub fn attach_object<T: Serialize>(
        &self,
        component: &mut Component,
        object: &T,
        meta: &ObjectMeta,
        kind: &str,
    ) -> bool {
        if self.is_source_properties_enabled() {
            component.source_properties = Some(self.source_properties(object));
            true
        } else {
            put_legacy_meta(&mut component.data, meta, kind);
            false
        }
    }

    pub fn source_properties<T: Serialize>(&self, object: &T) -> Data {
        source_properties::render(object, self.is_expose_status_enabled())
    }

    pub fn create_relation(&self, source: &str, target: &str, relation_type: RelationType) -> Relation {
        Relation::new(source, target, relation_type)
    }

    pub fn create_relation_data(
        &self,
        source: &str,
        target: &str,
        relation_type: RelationType,
        data: Data,
    ) -> Relation {
        Relation::with_data(source, target, relation_type, data)
    }

    pub async fn submit_component(&self, component: Component) -> CollectorResult<()> {
        self.sink.submit_component(component).await
    }

    pub async fn submit_relation(&self, relation: Relation) -> CollectorResult<()> {
        self.sink.submit_relation(relation).await
    }

    /// `namespace -> object : encloses`
    pub async fn submit_namespace_relation(&self, namespace: &str, external_id: &str) -> CollectorResult<()> {
        let namespace_id = self.urns.namespace_external_id(namespace);
        self.submit_relation(self.create_relation(&namespace_id, external_id, RelationType::Encloses))
            .await
    }
}

/// `kind`, `creationTimestamp`, `uid` and `generateName` for legacy data
pub fn put_legacy_meta(data: &mut Data, meta: &ObjectMeta, kind: &str) {
    data.put_non_empty("kind", kind);
    data.put_non_empty("creationTimestamp", &meta.creation_timestamp);
    data.put_non_empty("uid", &meta.uid);
    data.put_non_empty("generateName", &meta.generate_name);
}

pub fn meta_name(meta: &ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or_default()
}

pub fn meta_namespace(meta: &ObjectMeta) -> &str {
    meta.namespace.as_deref().unwrap_or_default()
}

pub fn owner_references(meta: &ObjectMeta) -> &[OwnerReference] {
    meta.owner_references.as_deref().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockApiClient;
    use crate::models::ClusterType;

    fn common(sink: TopologySink) -> ClusterTopologyCommon {
        let config = TopologyConfig {
            cluster_name: "test-cluster".to_string(),
            ..Default::default()
        };
        ClusterTopologyCommon::new(Arc::new(MockApiClient::new()), Arc::new(config), sink)
    }

    fn channels() -> (
        TopologySink,
        mpsc::Receiver<Component>,
        mpsc::Receiver<Relation>,
    ) {
        let (ctx, crx) = mpsc::channel(16);
        let (rtx, rrx) = mpsc::channel(16);
        (TopologySink::new(ctx, rtx, true, CancellationToken::new()), crx, rrx)
    }

    #[test]
    fn test_init_tags_is_idempotent() {
        let (sink, _crx, _rrx) = channels();
        let common = common(sink);
        let meta = ObjectMeta {
            namespace: Some("shop".to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), "web".to_string())])),
            ..Default::default()
        };

        let first = common.init_tags(&meta, "Deployment");
        let second = common.init_tags(&meta, "Deployment");

        assert_eq!(first, second);
        assert_eq!(first["app"], "web");
        assert_eq!(first["cluster-name"], "test-cluster");
        assert_eq!(first["cluster-type"], ClusterType::Kubernetes.as_str());
        assert_eq!(first["component-type"], "kubernetes-deployment");
        assert_eq!(first["namespace"], "shop");
        assert_eq!(meta.labels.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_cluster_scoped_objects_have_no_namespace_tag() {
        let (sink, _crx, _rrx) = channels();
        let tags = common(sink).init_tags(&ObjectMeta::default(), "Node");
        assert!(!tags.contains_key("namespace"));
    }

    #[tokio::test]
    async fn test_sink_defers_and_flushes() {
        let (sink, mut crx, mut rrx) = channels();

        sink.submit_relation(Relation::new("a", "b", RelationType::Uses))
            .await
            .unwrap();
        sink.submit_relation(Relation::new("a", "ghost", RelationType::Uses))
            .await
            .unwrap();
        sink.submit_component(Component::new("a", ComponentType::Pod, Data::new()))
            .await
            .unwrap();
        sink.submit_component(Component::new("b", ComponentType::ConfigMap, Data::new()))
            .await
            .unwrap();
        sink.submit_component(Component::new("b", ComponentType::ConfigMap, Data::new()))
            .await
            .unwrap();

        let dropped = sink.correlate_relations().await.unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(sink.components_emitted(), 2);
        assert_eq!(sink.relations_emitted(), 1);

        drop(sink);
        assert_eq!(crx.recv().await.unwrap().external_id, "a");
        assert_eq!(crx.recv().await.unwrap().external_id, "b");
        assert!(crx.recv().await.is_none());
        assert_eq!(rrx.recv().await.unwrap().external_id, "a->b");
        assert!(rrx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_stops_on_cancel() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        send_or_cancel(&tx, 1u8, &cancel, "test").await.unwrap();

        cancel.cancel();
        let result = send_or_cancel(&tx, 2u8, &cancel, "test").await;
        assert!(matches!(result, Err(CollectorError::Cancelled)));
    }

    #[tokio::test]
    async fn test_send_reports_closed_channel() {
        let (tx, rx) = mpsc::channel::<u8>(1);
        drop(rx);
        let result = send_or_cancel(&tx, 1, &CancellationToken::new(), "volume").await;
        assert!(matches!(
            result,
            Err(CollectorError::ChannelClosed { channel: "volume" })
        ));
    }
}
