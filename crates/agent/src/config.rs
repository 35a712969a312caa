//! Agent configuration

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use topology_lib::TopologyConfig;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "TOPOLOGY_CONFIG_FILE";

const ENV_PREFIX: &str = "TOPOLOGY";

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// API server port for health/metrics/topology
    pub api_port: u16,

    /// Seconds between two collection runs
    pub run_interval_secs: u64,

    /// Kubeconfig to use instead of the in-cluster configuration
    pub kubeconfig: Option<PathBuf>,

    pub topology: TopologyConfig,
}

#[derive(Debug, Deserialize)]
struct RunnerSettings {
    #[serde(default = "default_api_port")]
    api_port: u16,

    #[serde(default = "default_run_interval")]
    run_interval_secs: u64,

    #[serde(default)]
    kubeconfig: Option<PathBuf>,
}

fn default_api_port() -> u16 {
    8080
}

fn default_run_interval() -> u64 {
    60
}

impl AgentConfig {
    /// Load configuration from the optional config file and the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::load_from(file.as_deref(), Environment::with_prefix(ENV_PREFIX))
    }

    /// Layer `env` over the file at `path`, if any
    pub fn load_from(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(env.prefix_separator("_").separator("__"))
            .build()
            .context("Failed to load agent configuration")?;

        let runner: RunnerSettings = settings
            .clone()
            .try_deserialize()
            .context("Invalid runner settings")?;
        let topology: TopologyConfig = settings
            .try_deserialize()
            .context("Invalid topology settings")?;

        let config = Self {
            api_port: runner.api_port,
            run_interval_secs: runner.run_interval_secs,
            kubeconfig: runner.kubeconfig,
            topology,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.topology.cluster_name.trim().is_empty() {
            bail!("cluster_name is required");
        }
        if self.run_interval_secs == 0 {
            bail!("run_interval_secs must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(source))
    }

    fn yaml_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_with_cluster_name() {
        let config =
            AgentConfig::load_from(None, env(&[("TOPOLOGY_CLUSTER_NAME", "prod-eu")])).unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.run_interval_secs, 60);
        assert!(config.kubeconfig.is_none());
        assert_eq!(config.topology.cluster_name, "prod-eu");
        assert_eq!(config.topology.collect_timeout_secs, 300);
        assert!(config.topology.resources.secrets);
    }

    #[test]
    fn test_missing_cluster_name_is_rejected() {
        let err = AgentConfig::load_from(None, env(&[])).unwrap_err();
        assert!(err.to_string().contains("cluster_name"));
    }

    #[test]
    fn test_file_settings() {
        let file = yaml_file(
            r#"
cluster_name: staging
cluster_type: openshift
api_port: 9000
configmap_max_datasize: 2048
resources:
  secrets: false
"#,
        );

        let config = AgentConfig::load_from(Some(file.path()), env(&[])).unwrap();
        assert_eq!(config.api_port, 9000);
        assert_eq!(config.topology.cluster_name, "staging");
        assert_eq!(config.topology.configmap_max_data_size, 2048);
        assert!(!config.topology.resources.secrets);
        assert!(config.topology.resources.configmaps);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = yaml_file("cluster_name: staging\nrun_interval_secs: 30\n");

        let config = AgentConfig::load_from(
            Some(file.path()),
            env(&[
                ("TOPOLOGY_RUN_INTERVAL_SECS", "120"),
                ("TOPOLOGY_RESOURCES__JOBS", "false"),
            ]),
        )
        .unwrap();

        assert_eq!(config.topology.cluster_name, "staging");
        assert_eq!(config.run_interval_secs, 120);
        assert!(!config.topology.resources.jobs);
    }
}
