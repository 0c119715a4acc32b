//! Deterministic content fingerprints for change detection

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash a JSON value's content.
///
/// Object keys are serialized in sorted order (serde_json's default map is a
/// `BTreeMap`), so two values with equal content hash equally regardless of
/// insertion order. `None` hashes to `None`.
pub fn content_hash(value: Option<&Value>) -> Option<String> {
    let value = value?;
    let canonical = serde_json::to_vec(value).ok()?;
    Some(hex::encode(Sha256::digest(&canonical)))
}
