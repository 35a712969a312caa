//! Periodic topology collection

use crate::api::SnapshotStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use topology_lib::{
    health::components, HealthRegistry, PipelineError, StructuredLogger, TopologyPipeline,
};
use tracing::{error, info};

pub struct TopologyLoop {
    pipeline: Arc<TopologyPipeline>,
    interval: Duration,
    health: HealthRegistry,
    store: SnapshotStore,
    logger: StructuredLogger,
}

impl TopologyLoop {
    pub fn new(
        pipeline: Arc<TopologyPipeline>,
        interval: Duration,
        health: HealthRegistry,
        store: SnapshotStore,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            pipeline,
            interval,
            health,
            store,
            logger,
        }
    }

    /// Collect on every tick until shutdown is signalled
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.collect_once().await {
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Topology loop received shutdown");
                    break;
                }
            }
        }
    }

    /// Returns false once the pipeline has been stopped
    async fn collect_once(&self) -> bool {
        match self.pipeline.collect_snapshot().await {
            Ok(snapshot) => {
                if snapshot.failed_collectors.is_empty() {
                    self.health.set_healthy(components::PIPELINE).await;
                } else {
                    self.health
                        .set_degraded(
                            components::PIPELINE,
                            format!(
                                "collectors failed: {}",
                                snapshot.failed_collectors.join(", ")
                            ),
                        )
                        .await;
                }
                if snapshot.api_degraded() {
                    self.health
                        .set_degraded(
                            components::API_CLIENT,
                            format!("list calls failed: {}", snapshot.failed_resources.join(", ")),
                        )
                        .await;
                } else {
                    self.health.set_healthy(components::API_CLIENT).await;
                }
                self.health.set_healthy(components::EGRESS).await;
                self.store.publish(snapshot).await;
                self.health.set_ready(true).await;
                true
            }
            Err(PipelineError::Cancelled) => {
                self.logger.log_shutdown("pipeline stopped");
                false
            }
            Err(e @ PipelineError::Timeout(_)) => {
                error!(error = %e, "Topology run timed out");
                self.health
                    .set_unhealthy(components::PIPELINE, e.to_string())
                    .await;
                self.health
                    .set_degraded(components::API_CLIENT, "cluster API too slow")
                    .await;
                true
            }
            Err(e) => {
                error!(error = %e, "Topology run failed");
                self.health
                    .set_unhealthy(components::PIPELINE, e.to_string())
                    .await;
                true
            }
        }
    }
}
