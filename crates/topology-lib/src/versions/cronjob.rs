use super::{supports_minor, CRONJOB_V1_MIN_MINOR};
use crate::client::{ApiCollectorClient, CronJobV1Beta1};
use crate::models::Data;
use crate::source_properties;
use anyhow::Result;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// A CronJob from whichever API group the server serves
#[derive(Debug, Clone, PartialEq)]
pub enum CronJobObject {
    V1(CronJob),
    V1Beta1(CronJobV1Beta1),
}

/// List cron jobs from the group matching the server version
pub async fn list_cron_jobs(client: &dyn ApiCollectorClient) -> Result<Vec<CronJobObject>> {
    let version = client.get_version().await?;
    if supports_minor(&version, CRONJOB_V1_MIN_MINOR) {
        let items = client.get_cron_jobs_v1().await?;
        Ok(items.into_iter().map(CronJobObject::V1).collect())
    } else {
        let items = client.get_cron_jobs_v1b1().await?;
        Ok(items.into_iter().map(CronJobObject::V1Beta1).collect())
    }
}

impl CronJobObject {
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            CronJobObject::V1(c) => &c.metadata,
            CronJobObject::V1Beta1(c) => &c.metadata,
        }
    }

    pub fn schedule(&self) -> Option<&str> {
        match self {
            CronJobObject::V1(c) => c.spec.as_ref().map(|s| s.schedule.as_str()),
            CronJobObject::V1Beta1(c) => c.spec.as_ref().map(|s| s.schedule.as_str()),
        }
    }

    pub fn concurrency_policy(&self) -> Option<&str> {
        match self {
            CronJobObject::V1(c) => c.spec.as_ref()?.concurrency_policy.as_deref(),
            CronJobObject::V1Beta1(c) => c.spec.as_ref()?.concurrency_policy.as_deref(),
        }
    }

    pub fn source_properties(&self, expose_status: bool) -> Data {
        match self {
            CronJobObject::V1(c) => source_properties::render(c, expose_status),
            CronJobObject::V1Beta1(c) => source_properties::render(c, expose_status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::legacy::CronJobSpecV1Beta1;
    use crate::client::MockApiClient;
    use k8s_openapi::api::batch::v1::CronJobSpec;

    fn v1(name: &str) -> CronJob {
        CronJob {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ops".to_string()),
                ..Default::default()
            },
            spec: Some(CronJobSpec {
                schedule: "*/5 * * * *".to_string(),
                concurrency_policy: Some("Allow".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn v1beta1(name: &str) -> CronJobV1Beta1 {
        CronJobV1Beta1 {
            api_version: CronJobV1Beta1::API_VERSION.to_string(),
            kind: CronJobV1Beta1::KIND.to_string(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ops".to_string()),
                ..Default::default()
            },
            spec: Some(CronJobSpecV1Beta1 {
                schedule: "0 0 * * *".to_string(),
                concurrency_policy: Some("Forbid".to_string()),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn client(minor: &str) -> MockApiClient {
        let mut client = MockApiClient::new().with_version("1", minor);
        client.cron_jobs_v1.push(v1("current"));
        client.cron_jobs_v1b1.push(v1beta1("legacy"));
        client
    }

    #[tokio::test]
    async fn test_version_selects_api_group() {
        let old = list_cron_jobs(&client("20")).await.unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].metadata().name.as_deref(), Some("legacy"));
        assert_eq!(old[0].concurrency_policy(), Some("Forbid"));

        for minor in ["21", "25"] {
            let new = list_cron_jobs(&client(minor)).await.unwrap();
            assert_eq!(new[0].metadata().name.as_deref(), Some("current"));
            assert_eq!(new[0].schedule(), Some("*/5 * * * *"));
        }
    }

    #[test]
    fn test_legacy_source_properties_keep_group() {
        let rendered = CronJobObject::V1Beta1(v1beta1("legacy")).source_properties(false);
        assert_eq!(rendered["apiVersion"], "batch/v1beta1");
        assert_eq!(rendered["kind"], "CronJob");
    }
}
