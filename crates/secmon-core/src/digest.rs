//! # Content Digests
//!
//! Item revisions store the lowercase hex SHA-256 of a resource's canonical
//! bytes. Change detection is then a string comparison against the latest
//! stored revision.

use std::fmt::Write;

use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;

/// Hex SHA-256 of canonical bytes.
///
/// Takes `&CanonicalBytes` rather than `&[u8]` so a representation that
/// skipped canonicalization cannot be digested.
pub fn sha256_hex(data: &CanonicalBytes) -> String {
    Sha256::digest(data.as_bytes())
        .iter()
        .fold(String::with_capacity(64), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}
