//! # Error Hierarchy
//!
//! Structured error types shared by every secmon crate, built with
//! `thiserror`. Each variant carries the offending input so that operators
//! can diagnose misconfiguration without guesswork.

use thiserror::Error;

/// Top-level error type for the domain layer.
#[derive(Error, Debug)]
pub enum SecmonError {
    /// Canonicalization failure during digest computation.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// Domain value validation failure.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// JSON serialization failed during canonicalization.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Validation errors for domain values.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// Polling interval is not one of the allowed values.
    #[error("invalid polling interval: {0} minutes (allowed: 15, 60, 720, 1440, 10080)")]
    InvalidInterval(u32),

    /// An account identifier must be non-empty.
    #[error("account identifier must be non-empty")]
    EmptyIdentifier,

    /// An account name must be non-empty.
    #[error("account name must be non-empty")]
    EmptyAccountName,

    /// A technology name must be non-empty.
    #[error("technology name must be non-empty")]
    EmptyTechnology,

    /// A string did not name a known enum variant.
    #[error("unknown {kind}: \"{value}\"")]
    UnknownVariant {
        /// What was being parsed (e.g. "severity").
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_interval_lists_allowed_values() {
        let msg = ValidationError::InvalidInterval(30).to_string();
        assert!(msg.contains("30 minutes"));
        assert!(msg.contains("10080"));
    }

    #[test]
    fn secmon_error_wraps_validation() {
        let err = SecmonError::from(ValidationError::EmptyIdentifier);
        assert!(err.to_string().starts_with("validation error"));
    }

    #[test]
    fn unknown_variant_display() {
        let err = ValidationError::UnknownVariant {
            kind: "severity",
            value: "urgent".to_string(),
        };
        assert_eq!(err.to_string(), "unknown severity: \"urgent\"");
    }
}
