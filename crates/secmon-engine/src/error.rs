//! # Engine Errors
//!
//! Each failure domain has its own type so the coordinator can attribute a
//! failure to the right exception-log source:
//!
//! - [`CollectorError`]: a watcher failed or timed out.
//! - [`EvaluatorError`]: one auditor failed or timed out. Isolated per auditor.
//! - [`EngineError`]: anything that fails a pair's run (collector, store,
//!   canonicalization).
//! - [`AdminError`]: administrative operations, which fail loudly.

use std::path::PathBuf;
use std::time::Duration;

use secmon_core::{CanonicalizationError, ExceptionSource, ValidationError};
use secmon_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// A watcher could not produce the current state of its technology.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    /// The watcher reported a failure.
    #[error("collector failed: {0}")]
    Failed(String),

    /// The watcher did not finish within the configured timeout.
    #[error("collector timed out after {0:?}")]
    Timeout(Duration),

    /// No watcher is registered under this technology name.
    #[error("no watcher registered for technology '{0}'")]
    Unregistered(String),
}

/// One auditor could not evaluate the current items.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluatorError {
    /// The auditor reported a failure.
    #[error("evaluator failed: {0}")]
    Failed(String),

    /// The auditor did not finish within the configured timeout.
    #[error("evaluator timed out after {0:?}")]
    Timeout(Duration),
}

impl EvaluatorError {
    /// Short kind recorded in the exception log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Failed(_) => "evaluator_failed",
            Self::Timeout(_) => "evaluator_timeout",
        }
    }
}

/// A failure that ends one pair's run.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The watcher failed.
    #[error(transparent)]
    Collector(#[from] CollectorError),

    /// A store call failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A store call did not finish within the configured timeout.
    #[error("store call timed out after {0:?}")]
    StoreTimeout(Duration),

    /// A collected item could not be canonicalized for hashing.
    #[error("could not canonicalize '{resource_key}': {source}")]
    Canonicalization {
        /// The offending resource.
        resource_key: String,
        /// Underlying error.
        #[source]
        source: CanonicalizationError,
    },
}

impl EngineError {
    /// Which component the failure is attributed to.
    pub fn source_component(&self) -> ExceptionSource {
        match self {
            Self::Collector(_) | Self::Canonicalization { .. } => ExceptionSource::Watcher,
            Self::Store(_) | Self::StoreTimeout(_) => ExceptionSource::Store,
        }
    }

    /// Short kind recorded in the exception log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Collector(CollectorError::Failed(_)) => "collector_failed",
            Self::Collector(CollectorError::Timeout(_)) => "collector_timeout",
            Self::Collector(CollectorError::Unregistered(_)) => "unregistered",
            Self::Store(_) => "store_failed",
            Self::StoreTimeout(_) => "store_timeout",
            Self::Canonicalization { .. } => "canonicalization",
        }
    }
}

/// Invalid plugin registration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two watchers were registered under one technology name.
    #[error("technology '{0}' registered twice")]
    DuplicateTechnology(String),

    /// Two auditors with the same name were registered for one technology.
    #[error("auditor '{auditor}' registered twice for technology '{technology}'")]
    DuplicateAuditor {
        /// Technology name.
        technology: String,
        /// Auditor name.
        auditor: String,
    },

    /// An auditor was registered for a technology that has no watcher.
    #[error("auditor '{auditor}' registered for unknown technology '{technology}'")]
    UnknownTechnology {
        /// Technology name.
        technology: String,
        /// Auditor name.
        auditor: String,
    },
}

/// The reporting hook could not deliver a summary.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Delivery failed.
    #[error("report delivery failed: {0}")]
    Delivery(String),
}

/// Writing an export failed.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Filesystem error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization failed.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// An administrative operation was rejected or failed.
#[derive(Error, Debug)]
pub enum AdminError {
    /// The technology name is not registered.
    #[error("unknown technology '{0}'")]
    UnknownTechnology(String),

    /// Input failed domain validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No issue with this id exists.
    #[error("issue {0} not found")]
    IssueNotFound(Uuid),

    /// A store call failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Exporting failed.
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_exception_sources() {
        let collector = EngineError::from(CollectorError::Failed("denied".into()));
        assert_eq!(collector.source_component(), ExceptionSource::Watcher);
        assert_eq!(collector.kind(), "collector_failed");

        let store = EngineError::StoreTimeout(Duration::from_secs(30));
        assert_eq!(store.source_component(), ExceptionSource::Store);
        assert_eq!(store.kind(), "store_timeout");
    }

    #[test]
    fn collector_error_is_transparent() {
        let err = EngineError::from(CollectorError::Unregistered("s3".into()));
        assert_eq!(err.to_string(), "no watcher registered for technology 's3'");
    }

    #[test]
    fn evaluator_kinds() {
        assert_eq!(EvaluatorError::Failed("x".into()).kind(), "evaluator_failed");
        assert_eq!(
            EvaluatorError::Timeout(Duration::from_secs(1)).kind(),
            "evaluator_timeout"
        );
    }
}
