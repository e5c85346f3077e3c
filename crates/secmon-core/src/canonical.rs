//! # Canonical Serialization
//!
//! Defines [`CanonicalBytes`], the only construction path for bytes used in
//! resource digest computation.
//!
//! Collectors return resource representations whose key order depends on the
//! upstream API and on the JSON library that decoded them. Hashing those bytes
//! directly would report spurious changes, so every representation is
//! re-serialized here with:
//!
//! 1. Object keys sorted lexicographically (recursively).
//! 2. Compact separators (no whitespace).
//! 3. RFC 3339 timestamps normalized to UTC with a `Z` suffix, truncated to
//!    seconds.
//!
//! Fields that change on every collection (last-seen timestamps, request ids)
//! are removed beforehand with [`strip_ephemeral`].

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by canonicalization.
///
/// The inner `Vec<u8>` is private; downstream code cannot construct
/// `CanonicalBytes` except through [`CanonicalBytes::new()`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        let normalized = normalize(value);
        Ok(Self(serde_json::to_vec(&normalized)?))
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Recursively sort keys and normalize timestamps.
///
/// Keys are re-inserted in sorted order so the output is sorted whether or
/// not `serde_json` was built with `preserve_order`.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, normalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(normalize).collect()),
        Value::String(s) => match chrono::DateTime::parse_from_rfc3339(&s) {
            Ok(dt) => {
                let utc = dt.with_timezone(&chrono::Utc);
                Value::String(utc.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            }
            Err(_) => Value::String(s),
        },
        other => other,
    }
}

/// Remove the fields addressed by JSON pointers (RFC 6901) from `value`.
///
/// Only object members are removed; pointers that do not resolve, or that
/// address an array element, are ignored.
pub fn strip_ephemeral(value: &mut Value, pointers: &[String]) {
    for pointer in pointers {
        let Some((parent, last)) = pointer.rsplit_once('/') else {
            continue;
        };
        let key = last.replace("~1", "/").replace("~0", "~");
        let target = if parent.is_empty() {
            Some(&mut *value)
        } else {
            value.pointer_mut(parent)
        };
        if let Some(Value::Object(map)) = target {
            map.remove(&key);
        }
    }
}
