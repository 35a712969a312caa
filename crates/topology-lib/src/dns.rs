//! Host name resolution for ExternalName services

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// Resolves a host name to its IP addresses
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Vec<String>>;
}

/// Resolver backed by the system's name service
#[derive(Debug, Default, Clone)]
pub struct SystemResolver;

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<String>> {
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .with_context(|| format!("Failed to resolve host {}", host))?;

        let mut ips: Vec<String> = Vec::new();
        for addr in addrs {
            let ip = addr.ip().to_string();
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
        Ok(ips)
    }
}

/// Fixed host table; unknown hosts fail to resolve
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<String>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, addrs: &[&str]) -> Self {
        self.hosts.insert(
            host.to_string(),
            addrs.iter().map(|a| a.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<String>> {
        self.hosts
            .get(host)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such host: {}", host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticResolver::new().with_host("db.example.com", &["10.0.0.5"]);

        assert_eq!(
            resolver.resolve("db.example.com").await.unwrap(),
            vec!["10.0.0.5".to_string()]
        );
        assert!(resolver.resolve("unknown.example.com").await.is_err());
    }

    #[tokio::test]
    async fn test_system_resolver_handles_ip_literals() {
        let ips = SystemResolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(ips, vec!["127.0.0.1".to_string()]);
    }
}
