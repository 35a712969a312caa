//! HTTP API for health checks, Prometheus metrics and the latest topology

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use topology_lib::{HealthRegistry, TopologySnapshot};
use tracing::{info, warn};

/// Latest snapshot published by the runner
#[derive(Clone, Default)]
pub struct SnapshotStore {
    latest: Arc<RwLock<Option<Arc<TopologySnapshot>>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, snapshot: TopologySnapshot) {
        *self.latest.write().await = Some(Arc::new(snapshot));
    }

    pub async fn latest(&self) -> Option<Arc<TopologySnapshot>> {
        self.latest.read().await.clone()
    }
}

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub snapshots: SnapshotStore,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, snapshots: SnapshotStore) -> Self {
        Self {
            health_registry,
            snapshots,
        }
    }
}

/// Liveness: 200 while every part is at least degraded, 503 otherwise
async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    let health = state.health_registry.health().await;
    let code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(health)).into_response()
}

/// Readiness: 200 once a snapshot can be served
async fn readyz(State(state): State<Arc<AppState>>) -> Response {
    let readiness = state.health_registry.readiness().await;
    let code = match readiness.ready {
        true => StatusCode::OK,
        false => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(readiness)).into_response()
}

/// Prometheus text exposition of the default registry
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    match encoder.encode(&prometheus::gather(), &mut body) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Latest collected snapshot, 503 until the first run completes
async fn topology(State(state): State<Arc<AppState>>) -> Response {
    match state.snapshots.latest().await {
        Some(snapshot) => (StatusCode::OK, Json(snapshot.as_ref())).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "reason": "No topology snapshot collected yet" })),
        )
            .into_response(),
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/topology", get(topology))
        .with_state(state)
}

/// Serve the router on all interfaces until the process exits
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "API server listening");
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
