use super::{
    meta_name, meta_namespace, owner_references, ClusterTopologyCollector, ClusterTopologyCommon,
};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{ComponentType, DataExt, RelationType};
use async_trait::async_trait;

pub struct JobCollector {
    common: ClusterTopologyCommon,
}

impl JobCollector {
    pub fn new(common: ClusterTopologyCommon) -> Self {
        Self { common }
    }
}

#[async_trait]
impl ClusterTopologyCollector for JobCollector {
    fn name(&self) -> &'static str {
        "job-collector"
    }

    async fn collect(&mut self) -> CollectorResult<()> {
        let jobs = self
            .common
            .api_client()
            .get_jobs()
            .await
            .map_err(|e| CollectorError::api("jobs", e))?;

        for job in jobs {
            let namespace = meta_namespace(&job.metadata);
            let name = meta_name(&job.metadata);
            let external_id = self.common.urns().job_external_id(namespace, name);

            let tags = self.common.init_tags(&job.metadata, "Job");
            let mut component = self.common.new_component(
                external_id.clone(),
                ComponentType::Job,
                name,
                &tags,
                Vec::new(),
            );
            if !self
                .common
                .attach_object(&mut component, &job, &job.metadata, "Job")
            {
                let spec = job.spec.as_ref();
                component
                    .data
                    .put_non_empty("backoffLimit", spec.and_then(|s| s.backoff_limit));
                component
                    .data
                    .put_non_empty("parallelism", spec.and_then(|s| s.parallelism));
            }
            self.common.submit_component(component).await?;

            let mut owned_by_cron = false;
            for owner in owner_references(&job.metadata) {
                if owner.kind == "CronJob" {
                    let cron_id = self.common.urns().cronjob_external_id(namespace, &owner.name);
                    self.common
                        .submit_relation(self.common.create_relation(
                            &cron_id,
                            &external_id,
                            RelationType::Creates,
                        ))
                        .await?;
                    owned_by_cron = true;
                }
            }

            if !owned_by_cron {
                self.common
                    .submit_namespace_relation(namespace, &external_id)
                    .await?;
            }
        }

        Ok(())
    }
}
