//! Content fingerprint of a conversion request.
//!
//! The fingerprint is the SHA-256 of the compact JSON serialization of the
//! request's canonical fields, with keys in lexicographic order. Two requests
//! that would produce the same artifact share a fingerprint, so it doubles as
//! the object key in storage.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::request::NormalizedRequest;

/// SHA-256 identity of a rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Lowercase hex encoding, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Canonical field map of a request.
///
/// Every field is present; absent options serialize as `null`. The attribution
/// key is not part of it.
pub fn canonical_fields(request: &NormalizedRequest) -> BTreeMap<&'static str, Value> {
    BTreeMap::from([
        ("source", Value::from(request.source.as_str())),
        ("width", Value::from(request.width)),
        ("height", Value::from(request.height)),
        ("trimStartMs", Value::from(request.trim_start_ms)),
        ("trimEndMs", Value::from(request.trim_end_ms)),
        ("format", Value::from(request.format.name())),
        ("fps", Value::from(request.fps)),
        ("quality", Value::from(request.quality)),
        ("keyframeInterval", Value::from(request.keyframe_interval)),
    ])
}

/// Hash an ordered field map.
pub fn hash_fields<K: AsRef<str> + Ord>(fields: &BTreeMap<K, Value>) -> Fingerprint {
    let canonical: serde_json::Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.clone()))
        .collect();
    let json = Value::Object(canonical).to_string();
    Fingerprint(Sha256::digest(json.as_bytes()).into())
}

/// Fingerprint of a normalized request.
pub fn fingerprint(request: &NormalizedRequest) -> Fingerprint {
    hash_fields(&canonical_fields(request))
}
