use super::{meta_name, meta_namespace, put_legacy_meta, ClusterTopologyCollector, ClusterTopologyCommon};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{ComponentType, DataExt};
use crate::versions::list_cron_jobs;
use async_trait::async_trait;

/// Collects CronJobs from `batch/v1` or `batch/v1beta1` depending on the server
pub struct CronJobCollector {
    common: ClusterTopologyCommon,
}

impl CronJobCollector {
    pub fn new(common: ClusterTopologyCommon) -> Self {
        Self { common }
    }
}

#[async_trait]
impl ClusterTopologyCollector for CronJobCollector {
    fn name(&self) -> &'static str {
        "cronjob-collector"
    }

    async fn collect(&mut self) -> CollectorResult<()> {
        let cron_jobs = list_cron_jobs(self.common.api_client())
            .await
            .map_err(|e| CollectorError::api("cronjobs", e))?;

        for cron_job in cron_jobs {
            let meta = cron_job.metadata();
            let namespace = meta_namespace(meta);
            let name = meta_name(meta);
            let external_id = self.common.urns().cronjob_external_id(namespace, name);

            let tags = self.common.init_tags(meta, "CronJob");
            let mut component = self.common.new_component(
                external_id.clone(),
                ComponentType::CronJob,
                name,
                &tags,
                Vec::new(),
            );
            if self.common.is_source_properties_enabled() {
                component.source_properties =
                    Some(cron_job.source_properties(self.common.is_expose_status_enabled()));
            } else {
                put_legacy_meta(&mut component.data, meta, "CronJob");
                component.data.put_non_empty("schedule", cron_job.schedule());
                component
                    .data
                    .put_non_empty("concurrencyPolicy", cron_job.concurrency_policy());
            }
            self.common.submit_component(component).await?;

            self.common
                .submit_namespace_relation(namespace, &external_id)
                .await?;
        }

        Ok(())
    }
}
