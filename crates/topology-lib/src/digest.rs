//! Order independent digest over DNS name sets
//!
//! Used by the webhook certificate lifecycle to decide whether the set of
//! names a certificate must cover has changed.

use std::collections::BTreeSet;

const FNV_OFFSET_BASIS: u64 = 14_695_981_039_346_656_037;
const FNV_PRIME: u64 = 1_099_511_628_211;

/// 64-bit FNV-1 digest of the sorted, de-duplicated names.
///
/// The input is never reordered; an empty set yields the FNV offset basis.
pub fn digest_dns_names<S: AsRef<str>>(names: &[S]) -> u64 {
    let unique: BTreeSet<&str> = names.iter().map(AsRef::as_ref).collect();

    unique
        .iter()
        .flat_map(|name| name.bytes())
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            hash.wrapping_mul(FNV_PRIME) ^ u64::from(byte)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_order_independent() {
        let a = digest_dns_names(&["foo", "bar"]);
        let b = digest_dns_names(&["bar", "foo"]);

        assert_eq!(a, b);
        assert_eq!(a, 12531106902390217800);
    }

    #[test]
    fn test_digest_of_empty_set_is_offset_basis() {
        let empty: [&str; 0] = [];
        assert_eq!(digest_dns_names(&empty), 14695981039346656037);
    }

    #[test]
    fn test_digest_ignores_duplicates() {
        let once = digest_dns_names(&["svc.ns.svc", "svc.ns"]);
        let twice = digest_dns_names(&["svc.ns", "svc.ns.svc", "svc.ns", "svc.ns.svc"]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_digest_does_not_mutate_input() {
        let names = vec!["zeta".to_string(), "alpha".to_string()];
        let _ = digest_dns_names(&names);
        assert_eq!(names, vec!["zeta".to_string(), "alpha".to_string()]);
    }

    #[test]
    fn test_distinct_sets_differ() {
        assert_ne!(digest_dns_names(&["a"]), digest_dns_names(&["b"]));
    }
}
