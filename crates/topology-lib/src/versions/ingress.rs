use super::{supports_minor, INGRESS_NET_V1_MIN_MINOR};
use crate::client::{ApiCollectorClient, IngressV1Beta1};
use crate::models::Data;
use crate::source_properties;
use anyhow::Result;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// An Ingress from whichever API group the server serves
#[derive(Debug, Clone, PartialEq)]
pub enum IngressObject {
    NetV1(Ingress),
    ExtV1Beta1(IngressV1Beta1),
}

/// List ingresses from the group matching the server version
pub async fn list_ingresses(client: &dyn ApiCollectorClient) -> Result<Vec<IngressObject>> {
    let version = client.get_version().await?;
    if supports_minor(&version, INGRESS_NET_V1_MIN_MINOR) {
        let items = client.get_ingresses_net_v1().await?;
        Ok(items.into_iter().map(IngressObject::NetV1).collect())
    } else {
        let items = client.get_ingresses_ext_v1b1().await?;
        Ok(items.into_iter().map(IngressObject::ExtV1Beta1).collect())
    }
}

impl IngressObject {
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            IngressObject::NetV1(i) => &i.metadata,
            IngressObject::ExtV1Beta1(i) => &i.metadata,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            IngressObject::NetV1(_) => "Ingress",
            IngressObject::ExtV1Beta1(i) if !i.kind.is_empty() => &i.kind,
            IngressObject::ExtV1Beta1(_) => IngressV1Beta1::KIND,
        }
    }

    /// Service behind the default backend
    pub fn default_service_name(&self) -> Option<&str> {
        let name = match self {
            IngressObject::NetV1(i) => i
                .spec
                .as_ref()?
                .default_backend
                .as_ref()?
                .service
                .as_ref()
                .map(|s| s.name.as_str()),
            IngressObject::ExtV1Beta1(i) => {
                i.spec.as_ref()?.backend.as_ref()?.service_name.as_deref()
            }
        };
        name.filter(|n| !n.is_empty())
    }

    /// Services referenced by rule paths; rules without HTTP contribute nothing
    pub fn rule_service_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        match self {
            IngressObject::NetV1(i) => {
                let rules = i.spec.as_ref().and_then(|s| s.rules.as_ref());
                for rule in rules.into_iter().flatten() {
                    let Some(http) = rule.http.as_ref() else { continue };
                    for path in &http.paths {
                        if let Some(service) = path.backend.service.as_ref() {
                            names.push(service.name.as_str());
                        }
                    }
                }
            }
            IngressObject::ExtV1Beta1(i) => {
                let rules = i.spec.as_ref().and_then(|s| s.rules.as_ref());
                for rule in rules.into_iter().flatten() {
                    let Some(http) = rule.http.as_ref() else { continue };
                    for path in &http.paths {
                        if let Some(name) = path.backend.service_name.as_deref() {
                            names.push(name);
                        }
                    }
                }
            }
        }
        names.retain(|n| !n.is_empty());
        names
    }

    /// Load balancer host names and IPs, host name first per entry
    pub fn ingress_points(&self) -> Vec<String> {
        let mut points = Vec::new();
        let mut push = |hostname: Option<&String>, ip: Option<&String>| {
            for value in [hostname, ip].into_iter().flatten() {
                if !value.is_empty() {
                    points.push(value.clone());
                }
            }
        };

        match self {
            IngressObject::NetV1(i) => {
                let entries = i
                    .status
                    .as_ref()
                    .and_then(|s| s.load_balancer.as_ref())
                    .and_then(|lb| lb.ingress.as_ref());
                for entry in entries.into_iter().flatten() {
                    push(entry.hostname.as_ref(), entry.ip.as_ref());
                }
            }
            IngressObject::ExtV1Beta1(i) => {
                let entries = i
                    .status
                    .as_ref()
                    .and_then(|s| s.load_balancer.as_ref())
                    .and_then(|lb| lb.ingress.as_ref());
                for entry in entries.into_iter().flatten() {
                    push(entry.hostname.as_ref(), entry.ip.as_ref());
                }
            }
        }
        points
    }

    pub fn source_properties(&self, expose_status: bool) -> Data {
        match self {
            IngressObject::NetV1(i) => source_properties::render(i, expose_status),
            IngressObject::ExtV1Beta1(i) => source_properties::render(i, expose_status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockApiClient;
    use k8s_openapi::api::networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, IngressBackend, IngressLoadBalancerIngress,
        IngressLoadBalancerStatus, IngressRule, IngressServiceBackend, IngressSpec, IngressStatus,
    };

    fn backend(service: &str) -> IngressBackend {
        IngressBackend {
            service: Some(IngressServiceBackend {
                name: service.to_string(),
                port: None,
            }),
            resource: None,
        }
    }

    fn net_v1_ingress() -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("shop".to_string()),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                default_backend: Some(backend("fallback")),
                rules: Some(vec![
                    IngressRule {
                        host: Some("shop.example.com".to_string()),
                        http: Some(HTTPIngressRuleValue {
                            paths: vec![HTTPIngressPath {
                                path: Some("/".to_string()),
                                path_type: "Prefix".to_string(),
                                backend: backend("web"),
                            }],
                        }),
                    },
                    IngressRule {
                        host: Some("nohttp.example.com".to_string()),
                        http: None,
                    },
                ]),
                ..Default::default()
            }),
            status: Some(IngressStatus {
                load_balancer: Some(IngressLoadBalancerStatus {
                    ingress: Some(vec![IngressLoadBalancerIngress {
                        hostname: Some("lb.example.com".to_string()),
                        ip: Some("34.1.2.3".to_string()),
                        ports: None,
                    }]),
                }),
            }),
        }
    }

    #[test]
    fn test_net_v1_accessors() {
        let ingress = IngressObject::NetV1(net_v1_ingress());

        assert_eq!(ingress.default_service_name(), Some("fallback"));
        assert_eq!(ingress.rule_service_names(), vec!["web"]);
        assert_eq!(
            ingress.ingress_points(),
            vec!["lb.example.com".to_string(), "34.1.2.3".to_string()]
        );
        assert_eq!(ingress.kind(), "Ingress");
    }

    #[tokio::test]
    async fn test_list_ingresses_picks_group_by_version() {
        let mut client = MockApiClient::new().with_version("1", "18");
        client.ingresses_ext_v1b1.push(IngressV1Beta1::default());
        client.ingresses_net_v1.push(net_v1_ingress());

        let legacy = list_ingresses(&client).await.unwrap();
        assert!(matches!(legacy[..], [IngressObject::ExtV1Beta1(_)]));

        let mut client = MockApiClient::new().with_version("1", "22");
        client.ingresses_net_v1.push(net_v1_ingress());
        let current = list_ingresses(&client).await.unwrap();
        assert!(matches!(current[..], [IngressObject::NetV1(_)]));
    }

    #[tokio::test]
    async fn test_list_ingresses_fails_when_version_unavailable() {
        let client = MockApiClient::new().failing("version");
        assert!(list_ingresses(&client).await.is_err());
    }
}
