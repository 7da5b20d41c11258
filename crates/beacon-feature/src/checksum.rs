//! Content checksums for generated configuration
//!
//! The checksum of a payload is the SHA-256 of its canonical JSON form
//! (object keys sorted at every depth, no insignificant whitespace), so two
//! maps with the same entries hash the same regardless of insertion order.

use aws_lc_rs::digest::{digest, SHA256};
use serde::Serialize;
use serde_json::Value;

use beacon_common::CHECKSUM_ANNOTATION_PREFIX;

use crate::feature::FeatureId;
use crate::Result;

/// Checksum of any serializable payload
pub fn compute_checksum<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    let value = serde_json::to_value(payload)?;
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical)?;

    let hash = digest(&SHA256, canonical.as_bytes());
    Ok(hash.as_ref().iter().map(|b| format!("{:02x}", b)).collect())
}

/// Annotation key carrying the checksum of a feature's custom config
pub fn checksum_annotation_key(feature: FeatureId) -> String {
    format!("{}{}-custom-config", CHECKSUM_ANNOTATION_PREFIX, feature)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out)?;
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_checksum_is_hex_sha256() {
        let sum = compute_checksum("payload").unwrap();
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_checksum_ignores_map_order() {
        let mut first = HashMap::new();
        first.insert("b", "2");
        first.insert("a", "1");
        let mut second = BTreeMap::new();
        second.insert("a", "1");
        second.insert("b", "2");

        assert_eq!(
            compute_checksum(&first).unwrap(),
            compute_checksum(&second).unwrap()
        );
    }

    #[test]
    fn test_checksum_changes_with_content() {
        let a = serde_json::json!({"conf": "x"});
        let b = serde_json::json!({"conf": "y"});
        assert_ne!(compute_checksum(&a).unwrap(), compute_checksum(&b).unwrap());
    }

    #[test]
    fn test_checksum_keeps_array_order() {
        let a = serde_json::json!(["x", "y"]);
        let b = serde_json::json!(["y", "x"]);
        assert_ne!(compute_checksum(&a).unwrap(), compute_checksum(&b).unwrap());
    }

    #[test]
    fn test_annotation_key() {
        assert_eq!(
            checksum_annotation_key(FeatureId::new("kubernetesStateCore")),
            "checksum/kubernetesStateCore-custom-config"
        );
    }
}
