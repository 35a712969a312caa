//! Topology Agent - Kubernetes topology collection agent
//!
//! Runs inside the cluster, periodically lists the API objects and serves
//! the resulting components and relations next to health and metrics.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use topology_lib::{
    health::components, init_kube_client, ApiCollectorClient, HealthRegistry, KubeApiClient,
    StructuredLogger, TopologyMetrics, TopologyPipeline,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod runner;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting topology-agent");

    let config = config::AgentConfig::load()?;
    info!(
        cluster = %config.topology.cluster_name,
        cluster_type = %config.topology.cluster_type,
        interval_secs = config.run_interval_secs,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::API_CLIENT).await;
    health_registry.register(components::PIPELINE).await;
    health_registry.register(components::EGRESS).await;

    let metrics = TopologyMetrics::new();

    let logger = StructuredLogger::new(&config.topology.cluster_name);
    logger.log_startup(AGENT_VERSION, config.topology.cluster_type.as_str());

    let kube_client = init_kube_client(config.kubeconfig.as_deref()).await?;
    let client: Arc<dyn ApiCollectorClient> = Arc::new(KubeApiClient::new(kube_client));

    match client.get_version().await {
        Ok(version) => {
            info!(major = %version.major, minor = %version.minor, "Connected to Kubernetes API");
            health_registry.set_healthy(components::API_CLIENT).await;
        }
        Err(e) => {
            warn!(error = %e, "Kubernetes API not reachable yet");
            health_registry
                .set_unhealthy(components::API_CLIENT, e.to_string())
                .await;
        }
    }

    let pipeline = Arc::new(
        TopologyPipeline::builder()
            .client(client)
            .config(config.topology.clone())
            .metrics(metrics)
            .build()?,
    );

    let snapshots = api::SnapshotStore::new();
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        snapshots.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let topology_loop = runner::TopologyLoop::new(
        pipeline.clone(),
        Duration::from_secs(config.run_interval_secs),
        health_registry.clone(),
        snapshots,
        logger.clone(),
    );
    let runner_handle = tokio::spawn(topology_loop.run(shutdown_rx));

    let api_port = config.api_port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state).await {
            error!(error = %e, "API server failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    pipeline.stop_token().cancel();
    if let Err(e) = runner_handle.await {
        warn!(error = %e, "Topology loop ended abnormally");
    }

    info!("Shutdown complete");
    Ok(())
}
