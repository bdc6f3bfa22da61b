//! Evidence manifest sealing.
//!
//! A manifest body is canonicalized (lexicographically key-sorted at every
//! level, no whitespace between tokens) and hashed with SHA-256. The digest
//! rides inside the stored manifest under `integrity`; verification strips
//! that field and recomputes. Two calls over identical dependent rows produce
//! byte-identical canonical strings and therefore identical digests.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

pub const HASH_ALGO: &str = "sha256";

/// Canonical encoding: `serde_json`'s default map is BTree-backed, so any
/// `Value` built through `to_value` serializes with sorted keys at every
/// level; `to_string` emits the compact `,`/`:` separators.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

pub fn digest_hex(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Attach an `integrity` block computed over the body without it.
/// Returns the sealed manifest and its digest.
pub fn seal_manifest(body: Value) -> (Value, String) {
    let canonical = canonical_json(&body);
    let digest = digest_hex(&canonical);

    let mut manifest = body;
    if let Value::Object(map) = &mut manifest {
        map.insert(
            "integrity".to_string(),
            json!({
                "algorithm": HASH_ALGO,
                "digest": digest,
            }),
        );
    }
    (manifest, digest)
}

/// Recompute the digest of `manifest` minus its `integrity` block and compare.
pub fn verify_manifest(manifest: &Value) -> bool {
    let Value::Object(map) = manifest else {
        return false;
    };
    let Some(recorded) = map
        .get("integrity")
        .and_then(|i| i.get("digest"))
        .and_then(Value::as_str)
    else {
        return false;
    };

    let mut body = map.clone();
    body.remove("integrity");
    digest_hex(&canonical_json(&Value::Object(body))) == recorded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_encoding_sorts_keys_and_drops_whitespace() {
        let value = json!({"zulu": 1, "alpha": {"nested_z": true, "nested_a": [1, 2]}});
        assert_eq!(
            canonical_json(&value),
            r#"{"alpha":{"nested_a":[1,2],"nested_z":true},"zulu":1}"#
        );
    }

    #[test]
    fn digest_is_64_hex_chars() {
        let digest = digest_hex("{}");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn seal_is_deterministic_and_verifiable() {
        let body = json!({"incident": {"id": 1, "title": "t"}, "artifact_count": 0});
        let (first, first_digest) = seal_manifest(body.clone());
        let (_, second_digest) = seal_manifest(body);
        assert_eq!(first_digest, second_digest);
        assert_eq!(first["integrity"]["algorithm"], HASH_ALGO);
        assert!(verify_manifest(&first));
    }

    #[test]
    fn tampering_breaks_verification() {
        let (mut sealed, _) = seal_manifest(json!({"artifact_count": 0}));
        sealed["artifact_count"] = json!(5);
        assert!(!verify_manifest(&sealed));
    }
}
