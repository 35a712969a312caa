use super::{
    drain, ClusterTopologyCorrelator, PodEndpointCorrelation, PodLabelCorrelation,
    ServiceEndpointCorrelation, ServiceSelectorCorrelation,
};
use crate::collector::ClusterTopologyCommon;
use crate::error::CollectorResult;
use crate::models::RelationType;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::trace;

/// Inputs of the service to pod correlator
pub struct Service2PodReceivers {
    pub service_endpoints: mpsc::Receiver<ServiceEndpointCorrelation>,
    pub pod_endpoints: mpsc::Receiver<PodEndpointCorrelation>,
    pub pod_labels: mpsc::Receiver<PodLabelCorrelation>,
    pub service_selectors: mpsc::Receiver<ServiceSelectorCorrelation>,
}

/// Links services to the pods serving them.
///
/// Pods on the host network are matched through the endpoint address they
/// listen on. All other pods are matched through the service label selector.
pub struct Service2PodCorrelator {
    common: ClusterTopologyCommon,
    receivers: Service2PodReceivers,
}

impl Service2PodCorrelator {
    pub fn new(common: ClusterTopologyCommon, receivers: Service2PodReceivers) -> Self {
        Self { common, receivers }
    }
}

/// Every selector clause must be present in the labels. An empty selector
/// matches no pod.
pub(crate) fn selector_matches(
    selector: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
) -> bool {
    !selector.is_empty()
        && selector
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
}

#[async_trait]
impl ClusterTopologyCorrelator for Service2PodCorrelator {
    fn name(&self) -> &'static str {
        "service2pod-correlator"
    }

    async fn correlate(&mut self) -> CollectorResult<()> {
        let receivers = &mut self.receivers;
        let (service_endpoints, pod_endpoints, pod_labels, selectors) = tokio::join!(
            drain(&mut receivers.service_endpoints),
            drain(&mut receivers.pod_endpoints),
            drain(&mut receivers.pod_labels),
            drain(&mut receivers.service_selectors),
        );

        let urns = self.common.urns();
        let mut edges: Vec<(String, String)> = Vec::new();

        let pods_by_host_endpoint: HashMap<&str, &PodEndpointCorrelation> = pod_endpoints
            .iter()
            .map(|p| (p.host_endpoint.as_str(), p))
            .collect();
        for endpoint in &service_endpoints {
            if let Some(pod) = pods_by_host_endpoint.get(endpoint.endpoint.url.as_str()) {
                edges.push((
                    endpoint.service_external_id.clone(),
                    urns.pod_external_id(&pod.namespace, &pod.pod_name),
                ));
            }
        }

        let mut pods_by_namespace: HashMap<&str, Vec<&PodLabelCorrelation>> = HashMap::new();
        for pod in &pod_labels {
            pods_by_namespace
                .entry(pod.namespace.as_str())
                .or_default()
                .push(pod);
        }
        for service in &selectors {
            let Some(pods) = pods_by_namespace.get(service.namespace.as_str()) else {
                continue;
            };
            for pod in pods {
                if selector_matches(&service.selector, &pod.labels) {
                    edges.push((
                        service.service_external_id.clone(),
                        urns.pod_external_id(&pod.namespace, &pod.pod_name),
                    ));
                }
            }
        }

        let mut seen = HashSet::new();
        for (service_id, pod_id) in edges {
            if !seen.insert((service_id.clone(), pod_id.clone())) {
                continue;
            }
            trace!(service = %service_id, pod = %pod_id, "Correlated service to pod");
            self.common
                .submit_relation(self.common.create_relation(
                    &service_id,
                    &pod_id,
                    RelationType::Exposes,
                ))
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_selector_subset_matches() {
        let pod = labels(&[("app", "web"), ("tier", "frontend")]);
        assert!(selector_matches(&labels(&[("app", "web")]), &pod));
        assert!(selector_matches(
            &labels(&[("app", "web"), ("tier", "frontend")]),
            &pod
        ));
    }

    #[test]
    fn test_selector_mismatch() {
        let pod = labels(&[("app", "web")]);
        assert!(!selector_matches(&labels(&[("app", "api")]), &pod));
        assert!(!selector_matches(
            &labels(&[("app", "web"), ("tier", "frontend")]),
            &pod
        ));
    }

    #[test]
    fn test_empty_selector_matches_nothing() {
        assert!(!selector_matches(&BTreeMap::new(), &labels(&[("app", "web")])));
        assert!(!selector_matches(&BTreeMap::new(), &BTreeMap::new()));
    }
}
