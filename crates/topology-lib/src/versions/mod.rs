//! Version gated access to kinds whose API group moved between releases

mod cronjob;
mod ingress;

pub use cronjob::{list_cron_jobs, CronJobObject};
pub use ingress::{list_ingresses, IngressObject};

use crate::client::ServerVersion;
use tracing::warn;

/// First minor release serving `networking.k8s.io/v1` Ingress
pub const INGRESS_NET_V1_MIN_MINOR: u32 = 19;

/// First minor release serving `batch/v1` CronJob
pub const CRONJOB_V1_MIN_MINOR: u32 = 21;

/// Whether the server is `1.<min_minor>` or newer.
///
/// An unknown major version fails closed. A minor that does not parse
/// (after dropping suffixes such as the `+` in `21+`) fails open.
pub fn supports_minor(version: &ServerVersion, min_minor: u32) -> bool {
    if version.major.trim() != "1" {
        warn!(
            major = %version.major,
            minor = %version.minor,
            "Unsupported Kubernetes major version, using legacy API group"
        );
        return false;
    }

    let digits: String = version
        .minor
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();

    match digits.parse::<u32>() {
        Ok(minor) => minor >= min_minor,
        Err(e) => {
            warn!(
                minor = %version.minor,
                error = %e,
                "Could not parse Kubernetes minor version, assuming a current release"
            );
            true
        }
    }
}
