//! Integration tests for the agent API endpoints

#[allow(dead_code)]
#[path = "../src/api.rs"]
mod api;

use api::{create_router, AppState, SnapshotStore};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use topology_lib::{
    health::components, Component, ComponentType, Data, HealthRegistry, Relation, RelationType,
    RunReport, TopologyMetrics, TopologySnapshot,
};
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::API_CLIENT).await;
    health_registry.register(components::PIPELINE).await;
    health_registry.register(components::EGRESS).await;

    let state = Arc::new(AppState::new(health_registry, SnapshotStore::new()));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn sample_snapshot() -> TopologySnapshot {
    let now = chrono::Utc::now();
    let namespace = Component::new(
        "urn:kubernetes:/prod:namespace/default",
        ComponentType::Namespace,
        Data::new(),
    );
    let pod = Component::new(
        "urn:kubernetes:/prod:default:pod/web-0",
        ComponentType::Pod,
        Data::new(),
    );
    let relation = Relation::new(
        &namespace.external_id,
        &pod.external_id,
        RelationType::Encloses,
    );
    let report = RunReport {
        components: 2,
        relations: 1,
        ..Default::default()
    };
    TopologySnapshot::new(now, now, vec![namespace, pod], vec![relation], report)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["api_client"].is_object());
    assert!(health["components"]["pipeline"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    // A run with failed collectors still yields a partial snapshot
    state
        .health_registry
        .set_degraded(components::PIPELINE, "collectors failed: secret-collector")
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::PIPELINE, "topology run timed out")
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_before_first_snapshot() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_api_client_unhealthy() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::API_CLIENT, "connection refused")
        .await;

    let (status, _) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app().await;

    let metrics = TopologyMetrics::new();
    metrics.inc_runs();
    metrics.observe_run_duration(0.4);
    metrics.add_components(12);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("topology_runs_total"));
    assert!(metrics_text.contains("topology_components_emitted_total"));
    assert!(metrics_text.contains("topology_run_duration_seconds_bucket"));
    assert!(metrics_text.contains("topology_run_duration_seconds_count"));
}

#[tokio::test]
async fn test_topology_returns_503_before_first_snapshot() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/topology").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(reply["reason"].is_string());
}

#[tokio::test]
async fn test_topology_serves_latest_snapshot() {
    let (app, state) = setup_test_app().await;
    state.snapshots.publish(sample_snapshot()).await;

    let (status, body) = get(app, "/topology").await;
    assert_eq!(status, StatusCode::OK);

    let snapshot: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(snapshot["startSnapshot"], true);
    assert_eq!(snapshot["stopSnapshot"], true);
    assert_eq!(snapshot["components"].as_array().unwrap().len(), 2);
    assert_eq!(
        snapshot["components"][1]["externalID"],
        "urn:kubernetes:/prod:default:pod/web-0"
    );
    assert_eq!(snapshot["relations"][0]["type"], "encloses");
    assert_eq!(snapshot["failedCollectors"].as_array().unwrap().len(), 0);
}
