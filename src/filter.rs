//! Request body filters.
//!
//! A route may list the bodies it accepts per verb. Each entry is either
//! the exact raw body or a `{ "<algorithm>": "<hex digest>" }` object; a
//! request matching none of them is answered with 404.

use crate::config::BodyFilter;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use tracing::{debug, warn};

/// Whether the raw body satisfies at least one filter.
pub fn matches_any(filters: &[BodyFilter], body: &str) -> bool {
    filters.iter().any(|filter| matches(filter, body))
}

/// Whether the raw body satisfies a single filter.
pub fn matches(filter: &BodyFilter, body: &str) -> bool {
    match filter {
        BodyFilter::Raw(expected) => expected == body,
        BodyFilter::Digest(digests) => digests.iter().any(|(algorithm, expected)| {
            match digest_hex(algorithm, body.as_bytes()) {
                Some(actual) => {
                    debug!(%algorithm, %actual, "Body digest");
                    actual.eq_ignore_ascii_case(expected.trim())
                }
                None => {
                    warn!(%algorithm, "Unsupported body digest algorithm");
                    false
                }
            }
        }),
    }
}

/// Lower-case hex digest of `data`, or `None` for an unknown algorithm.
pub fn digest_hex(algorithm: &str, data: &[u8]) -> Option<String> {
    let algorithm = algorithm.to_ascii_lowercase().replace('-', "");
    let digest = match algorithm.as_str() {
        "md5" => hex::encode(Md5::digest(data)),
        "sha1" => hex::encode(Sha1::digest(data)),
        "sha224" => hex::encode(Sha224::digest(data)),
        "sha256" => hex::encode(Sha256::digest(data)),
        "sha384" => hex::encode(Sha384::digest(data)),
        "sha512" => hex::encode(Sha512::digest(data)),
        _ => return None,
    };
    Some(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn digest(algorithm: &str, hex: &str) -> BodyFilter {
        BodyFilter::Digest(HashMap::from([(algorithm.to_string(), hex.to_string())]))
    }

    #[test]
    fn test_known_digests() {
        assert_eq!(
            digest_hex("md5", b"abc").as_deref(),
            Some("900150983cd24fb0d6963f7d28e17f72")
        );
        assert_eq!(
            digest_hex("sha1", b"abc").as_deref(),
            Some("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        assert_eq!(
            digest_hex("SHA-256", b"abc").as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(digest_hex("crc32", b"abc"), None);
    }

    #[test]
    fn test_raw_filter() {
        let filters = vec![BodyFilter::Raw("{ \"text\": \"Raw body filter test\" }".to_string())];
        assert!(matches_any(&filters, "{ \"text\": \"Raw body filter test\" }"));
        assert!(!matches_any(&filters, "{\"text\":\"Raw body filter test\"}"));
    }

    #[test]
    fn test_digest_filter_ignores_case() {
        let filters = vec![digest("sha1", "A9993E364706816ABA3E25717850C26C9CD0D89D")];
        assert!(matches_any(&filters, "abc"));
        assert!(!matches_any(&filters, "abd"));
    }

    #[test]
    fn test_any_filter_may_match() {
        let filters = vec![
            BodyFilter::Raw("first".to_string()),
            digest("md5", "900150983cd24fb0d6963f7d28e17f72"),
        ];
        assert!(matches_any(&filters, "first"));
        assert!(matches_any(&filters, "abc"));
        assert!(!matches_any(&filters, "other"));
    }

    #[test]
    fn test_unknown_algorithm_never_matches() {
        assert!(!matches_any(&[digest("whirlpool", "00")], "abc"));
        assert!(!matches_any(&[], "abc"));
    }
}
