//! Payload sanitisers for Secrets and ConfigMaps
//!
//! Secret values never leave the process: they are replaced by a SHA-256
//! digest over the sorted key/value stream. ConfigMap values are capped so a
//! single object cannot blow up a snapshot.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

pub const REDACTED: &str = "<redacted>";
pub const LAST_APPLIED_CONFIG_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";
pub const OPENSHIFT_TOKEN_ANNOTATION: &str = "openshift.io/token-secret.value";

/// Key under which the digest replaces a Secret's data
pub const SECRET_DATA_HASH_KEY: &str = "<data hash>";

const REDACTED_ANNOTATIONS: [&str; 2] = [LAST_APPLIED_CONFIG_ANNOTATION, OPENSHIFT_TOKEN_ANNOTATION];

/// Hex SHA-256 over `key1 value1 key2 value2 ...` in key order
pub fn secret_data_hash(data: Option<&BTreeMap<String, ByteString>>) -> String {
    let mut hasher = Sha256::new();
    if let Some(data) = data {
        for (key, value) in data {
            hasher.update(key.as_bytes());
            hasher.update(&value.0);
        }
    }
    hex::encode(hasher.finalize())
}

/// Rewrite annotations known to carry credentials
pub fn redact_annotations(meta: &mut ObjectMeta) {
    if let Some(annotations) = meta.annotations.as_mut() {
        for name in REDACTED_ANNOTATIONS {
            if let Some(value) = annotations.get_mut(name) {
                *value = REDACTED.to_string();
            }
        }
    }
}

/// Expiry of the first certificate in a `tls.crt` payload, in ms since epoch.
///
/// Accepts plain PEM as well as PEM that was base64 encoded once more.
pub fn certificate_expiration(raw: &[u8]) -> Option<i64> {
    let pem = if contains_pem_header(raw) {
        raw.to_vec()
    } else {
        let trimmed: Vec<u8> = raw.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
        STANDARD.decode(trimmed).ok()?
    };

    let certs = match rustls_pemfile::certs(&mut pem.as_slice()) {
        Ok(certs) => certs,
        Err(e) => {
            debug!(error = %e, "Failed to read PEM certificate");
            return None;
        }
    };
    let der = certs.first()?;

    match x509_parser::parse_x509_certificate(der) {
        Ok((_, cert)) => Some(cert.validity().not_after.timestamp() * 1000),
        Err(e) => {
            debug!(error = %e, "Failed to parse x509 certificate");
            None
        }
    }
}

fn contains_pem_header(raw: &[u8]) -> bool {
    raw.windows(b"-----BEGIN".len())
        .any(|w| w == b"-----BEGIN")
}

/// Cap every entry at `max_size / entries`; 0 disables the cap
pub fn cut_data(data: &BTreeMap<String, String>, max_size: usize) -> BTreeMap<String, String> {
    if max_size == 0 || data.is_empty() {
        return data.clone();
    }

    let budget = max_size / data.len();
    data.iter()
        .map(|(key, value)| {
            if value.len() <= budget {
                return (key.clone(), value.clone());
            }
            let mut keep = budget;
            while !value.is_char_boundary(keep) {
                keep -= 1;
            }
            let (kept, dropped) = value.split_at(keep);
            (key.clone(), format!("{}{}", kept, cut_replacement(dropped)))
        })
        .collect()
}

/// Marker that replaces a dropped suffix
pub fn cut_replacement(dropped: &str) -> String {
    let digest = hex::encode(Sha256::digest(dropped.as_bytes()));
    format!("[dropped {} chars, hashsum: {}]", dropped.len(), &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CERT: &str = include_str!("testdata/tls.crt");
    const TEST_CERT_EXPIRY_MS: i64 = 2_107_799_016_000;

    fn bytes(s: &str) -> ByteString {
        ByteString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_secret_hash_over_sorted_entries() {
        let mut data = BTreeMap::new();
        data.insert("key2".to_string(), bytes("bG9uZ2Vyc2VjcmV0dmFsdWUy"));
        data.insert("key1".to_string(), bytes("dmFsdWUx"));

        assert_eq!(
            secret_data_hash(Some(&data)),
            "c20ca49dcb76feaaa1c14a2725263bf2290d0e5f3dc98d208b249f080fa64b45"
        );
    }

    #[test]
    fn test_secret_hash_of_missing_data() {
        assert_eq!(
            secret_data_hash(None),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_redact_annotations() {
        let mut meta = ObjectMeta {
            annotations: Some(BTreeMap::from([
                (LAST_APPLIED_CONFIG_ANNOTATION.to_string(), "{\"secret\":1}".to_string()),
                (OPENSHIFT_TOKEN_ANNOTATION.to_string(), "token".to_string()),
                ("team".to_string(), "payments".to_string()),
            ])),
            ..Default::default()
        };

        redact_annotations(&mut meta);
        let annotations = meta.annotations.unwrap();
        assert_eq!(annotations[LAST_APPLIED_CONFIG_ANNOTATION], REDACTED);
        assert_eq!(annotations[OPENSHIFT_TOKEN_ANNOTATION], REDACTED);
        assert_eq!(annotations["team"], "payments");
    }

    #[test]
    fn test_certificate_expiration_from_pem() {
        assert_eq!(
            certificate_expiration(TEST_CERT.as_bytes()),
            Some(TEST_CERT_EXPIRY_MS)
        );
    }

    #[test]
    fn test_certificate_expiration_from_base64_wrapped_pem() {
        let wrapped = STANDARD.encode(TEST_CERT);
        assert_eq!(
            certificate_expiration(wrapped.as_bytes()),
            Some(TEST_CERT_EXPIRY_MS)
        );
    }

    #[test]
    fn test_certificate_expiration_rejects_garbage() {
        assert_eq!(certificate_expiration(b"not a certificate"), None);
    }

    #[test]
    fn test_cut_data_per_key_budget() {
        let data = BTreeMap::from([
            ("a".to_string(), "x".repeat(6)),
            ("b".to_string(), "y".repeat(18)),
            ("c".to_string(), "A".repeat(500)),
        ]);

        let cut = cut_data(&data, 120);
        assert_eq!(cut["a"], "x".repeat(6));
        assert_eq!(cut["b"], "y".repeat(18));
        assert_eq!(
            cut["c"],
            format!("{}[dropped 460 chars, hashsum: 828798a87da42aa9]", "A".repeat(40))
        );
    }

    #[test]
    fn test_cut_data_zero_means_uncapped() {
        let data = BTreeMap::from([("big".to_string(), "A".repeat(100_000))]);
        assert_eq!(cut_data(&data, 0), data);
    }

    #[test]
    fn test_cut_data_respects_size_bound() {
        let data = BTreeMap::from([
            ("one".to_string(), "A".repeat(1000)),
            ("two".to_string(), "B".repeat(10)),
            ("three".to_string(), "C".repeat(333)),
        ]);
        let max_size = 90;
        let marker_len = cut_replacement(&"A".repeat(1000)).len();

        let total: usize = cut_data(&data, max_size).values().map(String::len).sum();
        assert!(total <= max_size + data.len() * marker_len);
    }

    #[test]
    fn test_cut_replacement_known_hashes() {
        assert_eq!(
            cut_replacement("A"),
            "[dropped 1 chars, hashsum: 559aead08264d579]"
        );
        assert_eq!(
            cut_replacement("BB"),
            "[dropped 2 chars, hashsum: fc686c314491e1f6]"
        );
    }
}
