use super::{meta_name, meta_namespace, ClusterTopologyCollector, ClusterTopologyCommon};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{ComponentType, DataExt};
use crate::sanitize::{
    certificate_expiration, redact_annotations, secret_data_hash, SECRET_DATA_HASH_KEY,
};
use async_trait::async_trait;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use tracing::debug;

const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";
const TLS_CERT_KEY: &str = "tls.crt";

/// Emits Secrets with their payload replaced by a digest
pub struct SecretCollector {
    common: ClusterTopologyCommon,
}

impl SecretCollector {
    pub fn new(common: ClusterTopologyCommon) -> Self {
        Self { common }
    }
}

#[async_trait]
impl ClusterTopologyCollector for SecretCollector {
    fn name(&self) -> &'static str {
        "secret-collector"
    }

    async fn collect(&mut self) -> CollectorResult<()> {
        let secrets = self
            .common
            .api_client()
            .get_secrets()
            .await
            .map_err(|e| CollectorError::api("secrets", e))?;

        for mut secret in secrets {
            redact_annotations(&mut secret.metadata);

            let namespace = meta_namespace(&secret.metadata).to_string();
            let name = meta_name(&secret.metadata).to_string();
            let external_id = self.common.urns().secret_external_id(&namespace, &name);
            let data_hash = secret_data_hash(secret.data.as_ref());

            let expiration = if secret.type_.as_deref() == Some(TLS_SECRET_TYPE) {
                let cert = secret.data.as_ref().and_then(|d| d.get(TLS_CERT_KEY));
                if cert.is_none() {
                    debug!(secret = %external_id, "TLS secret does not contain a certificate");
                }
                cert.and_then(|c| certificate_expiration(&c.0))
            } else {
                None
            };

            // no plaintext value survives past this point
            secret.data = Some(BTreeMap::from([(
                SECRET_DATA_HASH_KEY.to_string(),
                ByteString(data_hash.clone().into_bytes()),
            )]));
            secret.string_data = None;

            let tags = self.common.init_tags(&secret.metadata, "Secret");
            let mut component = self.common.new_component(
                external_id.clone(),
                ComponentType::Secret,
                &name,
                &tags,
                vec![external_id.clone()],
            );
            component.data.put_non_empty("certificateExpiration", expiration);

            if !self
                .common
                .attach_object(&mut component, &secret, &secret.metadata, "Secret")
            {
                component.data.put_non_empty("data", &data_hash);
            }
            self.common.submit_component(component).await?;

            self.common
                .submit_namespace_relation(&namespace, &external_id)
                .await?;
        }

        Ok(())
    }
}
