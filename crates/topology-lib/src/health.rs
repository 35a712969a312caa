//! Liveness and readiness state of the topology agent
//!
//! The runner reports the API client, the pipeline and snapshot egress here;
//! the HTTP layer only reads it. The overall status is the worst status of any
//! registered part.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving, e.g. a run where some collectors failed
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the component entered its current status
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Names of the parts the agent reports on
pub mod components {
    /// Kubernetes API reachability
    pub const API_CLIENT: &str = "api_client";
    /// Outcome of the latest collection run
    pub const PIPELINE: &str = "pipeline";
    /// Publication of the latest snapshot
    pub const EGRESS: &str = "egress";
}

#[derive(Debug, Default)]
struct RegistryState {
    components: BTreeMap<String, ComponentHealth>,
    has_snapshot: bool,
}

/// Shared health state, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `name` as healthy
    pub async fn register(&self, name: &str) {
        self.state
            .write()
            .await
            .components
            .insert(name.to_string(), ComponentHealth::new(ComponentStatus::Healthy, None));
    }

    async fn transition(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        let mut state = self.state.write().await;
        match state.components.get_mut(name) {
            Some(current) if current.status == status => current.message = message,
            _ => {
                state
                    .components
                    .insert(name.to_string(), ComponentHealth::new(status, message));
            }
        }
    }

    pub async fn set_healthy(&self, name: &str) {
        self.transition(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.transition(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.transition(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Flag whether a snapshot has been published
    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.has_snapshot = ready;
    }

    pub async fn status_of(&self, name: &str) -> Option<ComponentStatus> {
        self.state.read().await.components.get(name).map(|h| h.status)
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse {
            status,
            components: state.components.clone(),
        }
    }

    /// Ready once a snapshot exists and the API server is reachable.
    ///
    /// A failed or timed out run leaves the previous snapshot in place, so an
    /// unhealthy pipeline alone does not withdraw readiness.
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let api_down = state
            .components
            .get(components::API_CLIENT)
            .is_some_and(|h| h.status == ComponentStatus::Unhealthy);

        let reason = if !state.has_snapshot {
            Some("No topology snapshot collected yet")
        } else if api_down {
            Some("Kubernetes API unreachable")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}
