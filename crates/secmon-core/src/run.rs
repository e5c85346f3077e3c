//! # Pairs and Run Records
//!
//! The unit of scheduling is a [`Pair`]: one account watched for one
//! technology. [`LastRun`] is the only scheduling state kept per pair and is
//! written once a run has completed, whatever its outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// An (account, technology) combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    /// Account name.
    pub account: String,
    /// Technology name.
    pub technology: String,
}

impl Pair {
    /// Create a pair.
    pub fn new(account: impl Into<String>, technology: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            technology: technology.into(),
        }
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account, self.technology)
    }
}

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Watch (and audit, when requested) completed.
    Success,
    /// The run failed; details are in the exception log.
    Failure,
}

impl RunOutcome {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunOutcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(ValidationError::UnknownVariant {
                kind: "run outcome",
                value: other.to_string(),
            }),
        }
    }
}

/// The last completed run of a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRun {
    /// The pair.
    pub pair: Pair,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// How it ended.
    pub outcome: RunOutcome,
    /// Failures in a row, reset by a success.
    pub consecutive_failures: u32,
    /// Set once `consecutive_failures` reaches the attention threshold.
    pub needs_attention: bool,
    /// Message of the latest failure, cleared by a success.
    pub last_error: Option<String>,
}

impl LastRun {
    /// Build the record that follows `previous` after a run ends.
    ///
    /// `attention_threshold == 0` disables flagging.
    pub fn next(
        previous: Option<&LastRun>,
        pair: Pair,
        outcome: RunOutcome,
        error: Option<String>,
        finished_at: DateTime<Utc>,
        attention_threshold: u32,
    ) -> Self {
        let consecutive_failures = match outcome {
            RunOutcome::Success => 0,
            RunOutcome::Failure => previous
                .map(|p| p.consecutive_failures.saturating_add(1))
                .unwrap_or(1),
        };
        let needs_attention =
            attention_threshold > 0 && consecutive_failures >= attention_threshold;
        Self {
            pair,
            finished_at,
            outcome,
            consecutive_failures,
            needs_attention,
            last_error: match outcome {
                RunOutcome::Success => None,
                RunOutcome::Failure => error,
            },
        }
    }

    /// Whether this record is the one that crossed the attention threshold.
    pub fn newly_flagged(&self, previous: Option<&LastRun>) -> bool {
        self.needs_attention && !previous.map(|p| p.needs_attention).unwrap_or(false)
    }
}
