//! Topology collection run orchestration
//!
//! One run spawns every enabled collector and all correlators onto a
//! `JoinSet`, wires them together with bounded channels and waits for all of
//! them. Deferred relations are flushed once every worker has finished.

mod snapshot;


pub use snapshot::TopologySnapshot;

use crate::client::ApiCollectorClient;
use crate::collector::{
    ClusterCollector, ClusterTopologyCollector, ClusterTopologyCommon, ConfigMapCollector,
    CronJobCollector, DaemonSetCollector, DeploymentCollector, IngressCollector, JobCollector,
    NamespaceCollector, NodeCollector, PersistentVolumeCollector, PodCollector,
    PodCorrelationSenders, ReplicaSetCollector, SecretCollector, ServiceCollector,
    StatefulSetCollector, TopologySink,
};
use crate::config::TopologyConfig;
use crate::correlator::{
    ClusterTopologyCorrelator, ContainerCorrelator, Service2PodCorrelator, Service2PodReceivers,
    VolumeCorrelator,
};
use crate::dns::{DnsResolver, SystemResolver};
use crate::error::{CollectorError, CollectorResult, PipelineError};
use crate::models::{Component, Relation};
use crate::observability::{StructuredLogger, TopologyMetrics};
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A collector or correlator that ended in an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorFailure {
    pub name: &'static str,
    pub error: String,
    /// Resource whose list call failed, when the API server was the cause
    pub resource: Option<&'static str>,
}

/// Outcome of one run that finished within its timeout
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub failures: Vec<CollectorFailure>,
    pub components: usize,
    pub relations: usize,
    /// Deferred relations whose endpoints never appeared
    pub dropped_relations: usize,
    pub duration: Duration,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, name: &str) -> bool {
        self.failures.iter().any(|f| f.name == name)
    }
}

type WorkerSet = JoinSet<(&'static str, CollectorResult<()>)>;

fn spawn_collector(workers: &mut WorkerSet, mut collector: Box<dyn ClusterTopologyCollector>) {
    workers.spawn(async move {
        let name = collector.name();
        debug!(collector = name, "Collector started");
        (name, collector.collect().await)
    });
}

fn spawn_correlator(workers: &mut WorkerSet, mut correlator: Box<dyn ClusterTopologyCorrelator>) {
    workers.spawn(async move {
        let name = correlator.name();
        debug!(correlator = name, "Correlator started");
        (name, correlator.correlate().await)
    });
}

/// Runs topology collection against one cluster
pub struct TopologyPipeline {
    client: Arc<dyn ApiCollectorClient>,
    config: Arc<TopologyConfig>,
    resolver: Arc<dyn DnsResolver>,
    stop: CancellationToken,
    metrics: Option<TopologyMetrics>,
    logger: StructuredLogger,
    runs: AtomicU64,
}

impl TopologyPipeline {
    pub fn builder() -> TopologyPipelineBuilder {
        TopologyPipelineBuilder::new()
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// Token that stops the current and all later runs
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Run every collector and correlator once, writing to the given streams.
    ///
    /// Both streams are closed when the run returns. The caller must consume
    /// them concurrently since they are bounded.
    pub async fn run(
        &self,
        components: mpsc::Sender<Component>,
        relations: mpsc::Sender<Relation>,
    ) -> Result<RunReport, PipelineError> {
        let run_id = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let timeout = self.config.collect_timeout();
        let cancel = self.stop.child_token();
        let started = Instant::now();

        self.logger.log_run_started(run_id);
        if let Some(metrics) = &self.metrics {
            metrics.inc_runs();
        }

        let outcome = tokio::time::timeout(
            timeout,
            self.run_workers(components, relations, cancel.clone()),
        )
        .await;

        let mut report = match outcome {
            Ok(result) => result?,
            Err(_) => {
                cancel.cancel();
                warn!(
                    run_id = run_id,
                    timeout_secs = timeout.as_secs(),
                    "Topology run timed out, workers aborted"
                );
                return Err(PipelineError::Timeout(timeout));
            }
        };
        report.duration = started.elapsed();

        for failure in &report.failures {
            self.logger.log_collector_failed(failure.name, &failure.error);
        }
        self.logger.log_run_completed(
            run_id,
            report.components,
            report.relations,
            report.dropped_relations,
            report.failures.len(),
            report.duration.as_millis(),
        );
        if let Some(metrics) = &self.metrics {
            metrics.observe_run_duration(report.duration.as_secs_f64());
            metrics.add_components(report.components as u64);
            metrics.add_relations(report.relations as u64);
            metrics.add_dropped_relations(report.dropped_relations as u64);
            for failure in &report.failures {
                metrics.inc_collector_errors(failure.name);
            }
            metrics.set_last_successful_run(chrono::Utc::now().timestamp());
        }

        Ok(report)
    }

    /// Run once and gather both streams in memory
    pub async fn collect_snapshot(&self) -> Result<TopologySnapshot, PipelineError> {
        let buffer = self.config.buffer_size();
        let (components_tx, mut components_rx) = mpsc::channel(buffer);
        let (relations_tx, mut relations_rx) = mpsc::channel(buffer);

        let started_at = chrono::Utc::now();
        let gather = async {
            let mut components = Vec::new();
            let mut relations = Vec::new();
            let mut components_open = true;
            let mut relations_open = true;
            while components_open || relations_open {
                tokio::select! {
                    c = components_rx.recv(), if components_open => match c {
                        Some(c) => components.push(c),
                        None => components_open = false,
                    },
                    r = relations_rx.recv(), if relations_open => match r {
                        Some(r) => relations.push(r),
                        None => relations_open = false,
                    },
                }
            }
            (components, relations)
        };

        let (report, (components, relations)) =
            tokio::join!(self.run(components_tx, relations_tx), gather);
        let report = report?;

        Ok(TopologySnapshot::new(
            started_at,
            chrono::Utc::now(),
            components,
            relations,
            report,
        ))
    }

    async fn run_workers(
        &self,
        components: mpsc::Sender<Component>,
        relations: mpsc::Sender<Relation>,
        cancel: CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        let sink = TopologySink::new(
            components,
            relations,
            self.config.use_relation_cache,
            cancel.clone(),
        );
        let common = ClusterTopologyCommon::new(self.client.clone(), self.config.clone(), sink.clone());
        let mut workers = self.spawn_workers(&common);
        drop(common);

        let mut failures = Vec::new();
        while let Some(joined) = workers.join_next().await {
            let (name, result) = joined?;
            match result {
                Ok(()) => debug!(worker = name, "Worker finished"),
                Err(e) => failures.push(CollectorFailure {
                    name,
                    error: e.to_string(),
                    resource: match &e {
                        CollectorError::Api { resource, .. } => Some(*resource),
                        _ => None,
                    },
                }),
            }
        }

        if cancel.is_cancelled() {
            info!("Topology run stopped before completion");
            return Err(PipelineError::Cancelled);
        }

        let dropped_relations = sink.correlate_relations().await?;
        Ok(RunReport {
            failures,
            components: sink.components_emitted(),
            relations: sink.relations_emitted(),
            dropped_relations,
            duration: Duration::ZERO,
        })
    }

    fn spawn_workers(&self, common: &ClusterTopologyCommon) -> WorkerSet {
        let buffer = self.config.buffer_size();
        let resources = &self.config.resources;
        let mut workers = JoinSet::new();

        let (node_tx, node_rx) = mpsc::channel(buffer);
        let (container_tx, container_rx) = mpsc::channel(buffer);
        let (volume_tx, volume_rx) = mpsc::channel(buffer);
        let (pod_endpoint_tx, pod_endpoint_rx) = mpsc::channel(buffer);
        let (pod_label_tx, pod_label_rx) = mpsc::channel(buffer);
        let (service_endpoint_tx, service_endpoint_rx) = mpsc::channel(buffer);
        let (selector_tx, selector_rx) = mpsc::channel(buffer);

        let mut collectors: Vec<Box<dyn ClusterTopologyCollector>> = vec![
            Box::new(ClusterCollector::new(common.clone())),
            Box::new(NodeCollector::new(common.clone(), node_tx)),
            Box::new(PodCollector::new(
                common.clone(),
                PodCorrelationSenders {
                    containers: container_tx,
                    volumes: volume_tx,
                    endpoints: pod_endpoint_tx,
                    labels: pod_label_tx,
                },
            )),
            Box::new(ServiceCollector::new(
                common.clone(),
                self.resolver.clone(),
                service_endpoint_tx,
                selector_tx,
            )),
        ];
        if resources.namespaces {
            collectors.push(Box::new(NamespaceCollector::new(common.clone())));
        }
        if resources.configmaps {
            collectors.push(Box::new(ConfigMapCollector::new(common.clone())));
        }
        if resources.secrets {
            collectors.push(Box::new(SecretCollector::new(common.clone())));
        }
        if resources.daemonsets {
            collectors.push(Box::new(DaemonSetCollector::new(common.clone())));
        }
        if resources.deployments {
            collectors.push(Box::new(DeploymentCollector::new(common.clone())));
        }
        if resources.replicasets {
            collectors.push(Box::new(ReplicaSetCollector::new(common.clone())));
        }
        if resources.statefulsets {
            collectors.push(Box::new(StatefulSetCollector::new(common.clone())));
        }
        if resources.jobs {
            collectors.push(Box::new(JobCollector::new(common.clone())));
        }
        if resources.cronjobs {
            collectors.push(Box::new(CronJobCollector::new(common.clone())));
        }
        if resources.ingresses {
            collectors.push(Box::new(IngressCollector::new(common.clone())));
        }
        if resources.persistentvolumes || resources.persistentvolumeclaims {
            collectors.push(Box::new(PersistentVolumeCollector::new(common.clone())));
        }

        let correlators: Vec<Box<dyn ClusterTopologyCorrelator>> = vec![
            Box::new(ContainerCorrelator::new(common.clone(), node_rx, container_rx)),
            Box::new(VolumeCorrelator::new(common.clone(), volume_rx)),
            Box::new(Service2PodCorrelator::new(
                common.clone(),
                Service2PodReceivers {
                    service_endpoints: service_endpoint_rx,
                    pod_endpoints: pod_endpoint_rx,
                    pod_labels: pod_label_rx,
                    service_selectors: selector_rx,
                },
            )),
        ];

        debug!(
            collectors = collectors.len(),
            correlators = correlators.len(),
            "Spawning topology workers"
        );
        for collector in collectors {
            spawn_collector(&mut workers, collector);
        }
        for correlator in correlators {
            spawn_correlator(&mut workers, correlator);
        }
        workers
    }
}

/// Builder for [`TopologyPipeline`]
pub struct TopologyPipelineBuilder {
    client: Option<Arc<dyn ApiCollectorClient>>,
    config: TopologyConfig,
    resolver: Option<Arc<dyn DnsResolver>>,
    stop: Option<CancellationToken>,
    metrics: Option<TopologyMetrics>,
}

impl TopologyPipelineBuilder {
    pub fn new() -> Self {
        Self {
            client: None,
            config: TopologyConfig::default(),
            resolver: None,
            stop: None,
            metrics: None,
        }
    }

    /// Set the Kubernetes API client
    pub fn client(mut self, client: Arc<dyn ApiCollectorClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn config(mut self, config: TopologyConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolver for ExternalName services (default: system resolver)
    pub fn resolver(mut self, resolver: Arc<dyn DnsResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn stop_token(mut self, stop: CancellationToken) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Record run statistics in the global Prometheus registry
    pub fn metrics(mut self, metrics: TopologyMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<TopologyPipeline> {
        let client = self
            .client
            .ok_or_else(|| anyhow::anyhow!("API client is required"))?;
        let logger = StructuredLogger::new(self.config.cluster_name.clone());

        Ok(TopologyPipeline {
            client,
            config: Arc::new(self.config),
            resolver: self.resolver.unwrap_or_else(|| Arc::new(SystemResolver)),
            stop: self.stop.unwrap_or_default(),
            metrics: self.metrics,
            logger,
            runs: AtomicU64::new(0),
        })
    }
}

impl Default for TopologyPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
