//! Kubernetes topology collection
//!
//! This crate provides the core functionality for:
//! - Listing cluster objects through a pluggable API client
//! - Turning them into components and relations with stable URNs
//! - Correlating containers, volumes and services across kinds
//! - Health checks and observability for the runner

pub mod client;
pub mod collector;
pub mod config;
pub mod correlator;
pub mod digest;
pub mod dns;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod sanitize;
pub mod source_properties;
pub mod urn;
pub mod versions;

pub use client::{init_kube_client, ApiCollectorClient, KubeApiClient, MockApiClient};
pub use config::{ResourcesConfig, TopologyConfig};
pub use digest::digest_dns_names;
pub use error::{CollectorError, PipelineError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, TopologyMetrics};
pub use pipeline::{CollectorFailure, RunReport, TopologyPipeline, TopologySnapshot};
pub use urn::UrnBuilder;
