//! Topology collection settings

use crate::models::{ClusterInstance, ClusterType};
use serde::Deserialize;
use std::time::Duration;

/// Default cap on the total size of a ConfigMap's `data` (bytes)
pub const DEFAULT_CONFIGMAP_MAX_DATA_SIZE: usize = 100 * 1024;

/// Settings for one topology collection run
#[derive(Debug, Clone, Deserialize)]
pub struct TopologyConfig {
    /// Human cluster name, used as URN ground truth
    #[serde(default)]
    pub cluster_name: String,

    /// `kubernetes` or `openshift`
    #[serde(default)]
    pub cluster_type: ClusterType,

    /// Upper bound for a single run in seconds
    #[serde(default = "default_collect_timeout")]
    pub collect_timeout_secs: u64,

    /// Attach a sanitised rendering of each object as source properties
    #[serde(default = "default_true")]
    pub source_properties_enabled: bool,

    /// Keep `status` and `resourceVersion` in source properties
    #[serde(default)]
    pub expose_kubernetes_status_enabled: bool,

    /// Map CSI backed persistent volumes to volume sources
    #[serde(default)]
    pub csi_pv_mapper_enabled: bool,

    /// Proportional cap on ConfigMap data; 0 disables the cap
    #[serde(default = "default_configmap_max_datasize", alias = "configmap_max_datasize")]
    pub configmap_max_data_size: usize,

    /// Defer relations until both endpoints are known
    #[serde(default = "default_true")]
    pub use_relation_cache: bool,

    /// Capacity of each pipeline channel
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,

    #[serde(default)]
    pub resources: ResourcesConfig,
}

/// Per-kind collection toggles
#[derive(Debug, Clone, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default = "default_true")]
    pub persistentvolumes: bool,
    #[serde(default = "default_true")]
    pub persistentvolumeclaims: bool,
    #[serde(default = "default_true")]
    pub endpoints: bool,
    #[serde(default = "default_true")]
    pub namespaces: bool,
    #[serde(default = "default_true")]
    pub configmaps: bool,
    #[serde(default = "default_true")]
    pub daemonsets: bool,
    #[serde(default = "default_true")]
    pub deployments: bool,
    #[serde(default = "default_true")]
    pub replicasets: bool,
    #[serde(default = "default_true")]
    pub statefulsets: bool,
    #[serde(default = "default_true")]
    pub ingresses: bool,
    #[serde(default = "default_true")]
    pub jobs: bool,
    #[serde(default = "default_true")]
    pub cronjobs: bool,
    #[serde(default = "default_true")]
    pub secrets: bool,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            persistentvolumes: true,
            persistentvolumeclaims: true,
            endpoints: true,
            namespaces: true,
            configmaps: true,
            daemonsets: true,
            deployments: true,
            replicasets: true,
            statefulsets: true,
            ingresses: true,
            jobs: true,
            cronjobs: true,
            secrets: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_collect_timeout() -> u64 {
    300
}

fn default_configmap_max_datasize() -> usize {
    DEFAULT_CONFIGMAP_MAX_DATA_SIZE
}

fn default_channel_buffer_size() -> usize {
    128
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            cluster_name: String::new(),
            cluster_type: ClusterType::Kubernetes,
            collect_timeout_secs: default_collect_timeout(),
            source_properties_enabled: true,
            expose_kubernetes_status_enabled: false,
            csi_pv_mapper_enabled: false,
            configmap_max_data_size: DEFAULT_CONFIGMAP_MAX_DATA_SIZE,
            use_relation_cache: true,
            channel_buffer_size: default_channel_buffer_size(),
            resources: ResourcesConfig::default(),
        }
    }
}

impl TopologyConfig {
    pub fn instance(&self) -> ClusterInstance {
        ClusterInstance::new(self.cluster_type, self.cluster_name.clone())
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_secs(self.collect_timeout_secs)
    }

    /// PVC to PV lookups in the volume correlator follow the PVC toggle
    pub fn discover_persistent_volume_claims(&self) -> bool {
        self.resources.persistentvolumeclaims
    }

    /// Channels never get a zero capacity
    pub fn buffer_size(&self) -> usize {
        self.channel_buffer_size.max(1)
    }
}
