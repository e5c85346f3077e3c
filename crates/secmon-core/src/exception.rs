//! # Exception Log Entries
//!
//! Operational failures are appended to the exception log with an expiry.
//! Nothing in the scheduling loop reads them back; they exist for operators
//! and are removed by a separate retention sweep.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Which component recorded the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionSource {
    /// A watcher (collector) failed or timed out.
    Watcher,
    /// An auditor (rule evaluator) failed or timed out.
    Auditor,
    /// The persistent store failed.
    Store,
    /// The reporting hook failed to deliver.
    Report,
    /// An administrative operation failed.
    Admin,
}

impl ExceptionSource {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Watcher => "watcher",
            Self::Auditor => "auditor",
            Self::Store => "store",
            Self::Report => "report",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for ExceptionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExceptionSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "watcher" => Ok(Self::Watcher),
            "auditor" => Ok(Self::Auditor),
            "store" => Ok(Self::Store),
            "report" => Ok(Self::Report),
            "admin" => Ok(Self::Admin),
            other => Err(ValidationError::UnknownVariant {
                kind: "exception source",
                value: other.to_string(),
            }),
        }
    }
}

/// One exception log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionEntry {
    /// Unique identifier.
    pub id: Uuid,
    /// Component that failed.
    pub source: ExceptionSource,
    /// Short machine-readable failure kind (e.g. `timeout`).
    pub kind: String,
    /// Technology involved, if any.
    pub technology: Option<String>,
    /// Account involved, if any.
    pub account: Option<String>,
    /// Human-readable failure message.
    pub message: String,
    /// When the failure happened.
    pub occurred_at: DateTime<Utc>,
    /// When the entry becomes eligible for purging.
    pub expires_at: DateTime<Utc>,
}

impl ExceptionEntry {
    /// Create an entry that expires `ttl` after `occurred_at`.
    pub fn new(
        source: ExceptionSource,
        kind: impl Into<String>,
        message: impl Into<String>,
        occurred_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            kind: kind.into(),
            technology: None,
            account: None,
            message: message.into(),
            occurred_at,
            expires_at: occurred_at + ttl,
        }
    }

    /// Builder: attach the pair context.
    pub fn for_pair(mut self, account: impl Into<String>, technology: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self.technology = Some(technology.into());
        self
    }

    /// Whether the entry may be purged at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_follows_ttl() {
        let t0 = Utc::now();
        let entry = ExceptionEntry::new(
            ExceptionSource::Watcher,
            "timeout",
            "fetch timed out",
            t0,
            Duration::days(10),
        )
        .for_pair("prod", "s3");
        assert_eq!(entry.account.as_deref(), Some("prod"));
        assert!(!entry.is_expired(t0 + Duration::days(9)));
        assert!(entry.is_expired(t0 + Duration::days(10)));
    }

    #[test]
    fn source_parses_storage_form() {
        for source in [
            ExceptionSource::Watcher,
            ExceptionSource::Auditor,
            ExceptionSource::Store,
            ExceptionSource::Report,
            ExceptionSource::Admin,
        ] {
            assert_eq!(source.as_str().parse::<ExceptionSource>(), Ok(source));
        }
    }
}
