//! Recognition of volume backing stores
//!
//! Pod volumes and persistent volumes name their backing store through one of
//! many optional source fields. The mappers below turn the ones we know into
//! stable URNs; the first mapper that matches wins.

use crate::collector::Tags;
use crate::models::Data;
use crate::urn::UrnBuilder;
use k8s_openapi::api::core::v1::{PersistentVolume, Volume};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use serde_json::Value;

pub const VOLUME_API_VERSION: &str = "v1";

/// Source properties record for a pod volume
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct K8sVolume {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub volume: Volume,
}

impl K8sVolume {
    pub fn new(metadata: ObjectMeta, volume: Volume) -> Self {
        Self {
            api_version: VOLUME_API_VERSION,
            kind: "Volume",
            metadata,
            volume,
        }
    }
}

/// Source properties record for the backing store of a persistent volume
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct K8sVolumeSource {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    pub source: Data,
}

impl K8sVolumeSource {
    pub fn new(metadata: ObjectMeta, source: Data) -> Self {
        Self {
            api_version: VOLUME_API_VERSION,
            kind: "VolumeSource",
            metadata,
            source,
        }
    }
}

/// A component to create for a recognised backing store
#[derive(Debug, Clone, PartialEq)]
pub struct MappedVolume {
    pub external_id: String,
    pub name: String,
    pub identifiers: Vec<String>,
    pub tags: Tags,
}

impl MappedVolume {
    fn new(external_id: String, name: &str, kind: &str) -> Self {
        Self {
            external_id,
            name: name.to_string(),
            identifiers: Vec::new(),
            tags: Tags::from([("kind".to_string(), kind.to_string())]),
        }
    }
}

/// Where a pod volume points
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeTarget {
    /// A component another collector emits
    Existing(String),
    Create(MappedVolume),
}

/// Context a pod volume is resolved in
pub struct PodVolumeContext<'a> {
    pub urns: &'a UrnBuilder,
    pub namespace: &'a str,
    pub pod_name: &'a str,
    pub node_name: &'a str,
}

type PodVolumeMapper = fn(&PodVolumeContext<'_>, &Volume) -> Option<VolumeTarget>;

const POD_VOLUME_MAPPERS: [PodVolumeMapper; 6] = [
    map_config_map,
    map_secret,
    map_empty_dir,
    map_host_path,
    map_aws_ebs,
    map_gce_pd,
];

/// Resolve a pod volume; volumes without a recognised source are empty dirs
pub fn map_pod_volume(ctx: &PodVolumeContext<'_>, volume: &Volume) -> VolumeTarget {
    POD_VOLUME_MAPPERS
        .iter()
        .find_map(|mapper| mapper(ctx, volume))
        .unwrap_or_else(|| VolumeTarget::Create(empty_dir(ctx, volume)))
}

fn map_config_map(ctx: &PodVolumeContext<'_>, volume: &Volume) -> Option<VolumeTarget> {
    let name = volume.config_map.as_ref()?.name.as_deref()?;
    Some(VolumeTarget::Existing(
        ctx.urns.configmap_external_id(ctx.namespace, name),
    ))
}

fn map_secret(ctx: &PodVolumeContext<'_>, volume: &Volume) -> Option<VolumeTarget> {
    let name = volume.secret.as_ref()?.secret_name.as_deref()?;
    Some(VolumeTarget::Existing(
        ctx.urns.secret_external_id(ctx.namespace, name),
    ))
}

fn map_empty_dir(ctx: &PodVolumeContext<'_>, volume: &Volume) -> Option<VolumeTarget> {
    volume.empty_dir.as_ref()?;
    Some(VolumeTarget::Create(empty_dir(ctx, volume)))
}

fn empty_dir(ctx: &PodVolumeContext<'_>, volume: &Volume) -> MappedVolume {
    let path = format!("{}/{}/{}", ctx.namespace, ctx.pod_name, volume.name);
    MappedVolume::new(
        ctx.urns.volume_external_id("empty-dir", &path),
        &volume.name,
        "empty-dir",
    )
}

fn map_host_path(ctx: &PodVolumeContext<'_>, volume: &Volume) -> Option<VolumeTarget> {
    let path = volume.host_path.as_ref()?.path.as_str();
    let external_id = ctx.urns.external_volume_external_id(
        "hostpath",
        &[ctx.node_name, path.trim_start_matches('/')],
    );
    Some(VolumeTarget::Create(MappedVolume::new(
        external_id,
        &volume.name,
        "hostpath",
    )))
}

fn map_aws_ebs(ctx: &PodVolumeContext<'_>, volume: &Volume) -> Option<VolumeTarget> {
    let ebs = volume.aws_elastic_block_store.as_ref()?;
    Some(VolumeTarget::Create(MappedVolume::new(
        aws_ebs_external_id(ctx.urns, &ebs.volume_id, ebs.partition),
        &volume.name,
        "aws-ebs",
    )))
}

fn map_gce_pd(ctx: &PodVolumeContext<'_>, volume: &Volume) -> Option<VolumeTarget> {
    let pd = volume.gce_persistent_disk.as_ref()?;
    Some(VolumeTarget::Create(MappedVolume::new(
        ctx.urns.external_volume_external_id("gce-pd", &[&pd.pd_name]),
        &volume.name,
        "gce-pd",
    )))
}

/// `aws://<zone>/vol-123` and `vol-123` both name the same disk
fn aws_ebs_external_id(urns: &UrnBuilder, volume_id: &str, partition: Option<i32>) -> String {
    let volume_id = volume_id.rsplit('/').next().unwrap_or(volume_id);
    let partition = partition.unwrap_or(0).to_string();
    urns.external_volume_external_id("aws-ebs", &[volume_id, &partition])
}

/// Backing store of a persistent volume, with the raw source for rendering
pub fn map_persistent_volume(
    urns: &UrnBuilder,
    pv: &PersistentVolume,
    csi_enabled: bool,
) -> Option<(MappedVolume, Data)> {
    let spec = pv.spec.as_ref()?;
    let pv_name = pv.metadata.name.as_deref().unwrap_or_default();

    let (mapped, key, source) = if let Some(ebs) = spec.aws_elastic_block_store.as_ref() {
        (
            MappedVolume::new(
                aws_ebs_external_id(urns, &ebs.volume_id, ebs.partition),
                &ebs.volume_id,
                "aws-ebs",
            ),
            "awsElasticBlockStore",
            serde_json::to_value(ebs),
        )
    } else if let Some(pd) = spec.gce_persistent_disk.as_ref() {
        (
            MappedVolume::new(
                urns.external_volume_external_id("gce-pd", &[&pd.pd_name]),
                &pd.pd_name,
                "gce-pd",
            ),
            "gcePersistentDisk",
            serde_json::to_value(pd),
        )
    } else if let Some(host_path) = spec.host_path.as_ref() {
        (
            MappedVolume::new(
                urns.external_volume_external_id(
                    "hostpath",
                    &[pv_name, host_path.path.trim_start_matches('/')],
                ),
                &host_path.path,
                "hostpath",
            ),
            "hostPath",
            serde_json::to_value(host_path),
        )
    } else if let Some(csi) = spec.csi.as_ref().filter(|_| csi_enabled) {
        let mut mapped = MappedVolume::new(
            urns.external_volume_external_id("csi", &[&csi.driver, &csi.volume_handle]),
            &csi.volume_handle,
            "csi",
        );
        mapped
            .tags
            .insert("csi-driver".to_string(), csi.driver.clone());
        (mapped, "csi", serde_json::to_value(csi))
    } else {
        return None;
    };

    let mut data = Data::new();
    data.insert(key.to_string(), source.unwrap_or(Value::Null));
    Some((mapped, data))
}
