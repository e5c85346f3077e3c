//! # Item Revisions
//!
//! A revision is an immutable snapshot of one resource for one
//! (account, technology) pair. New revisions are only written when the
//! canonical digest changes, so the history of a resource is the list of its
//! distinct states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canonical::{strip_ephemeral, CanonicalBytes};
use crate::digest::sha256_hex;
use crate::error::{CanonicalizationError, ValidationError};
use crate::run::Pair;

/// One resource as returned by a watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedItem {
    /// Natural key of the resource, unique within its pair (e.g. an ARN).
    pub resource_key: String,
    /// The resource's representation.
    pub config: serde_json::Value,
}

impl CollectedItem {
    /// Create a collected item.
    pub fn new(resource_key: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            resource_key: resource_key.into(),
            config,
        }
    }

    /// Digest of the representation with `ephemeral_paths` removed.
    pub fn digest(&self, ephemeral_paths: &[String]) -> Result<String, CanonicalizationError> {
        if ephemeral_paths.is_empty() {
            return Ok(sha256_hex(&CanonicalBytes::new(&self.config)?));
        }
        let mut stripped = self.config.clone();
        strip_ephemeral(&mut stripped, ephemeral_paths);
        Ok(sha256_hex(&CanonicalBytes::new(&stripped)?))
    }
}

/// Whether a revision records a live resource or its disappearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionState {
    /// The resource was present when observed.
    Active,
    /// The resource was no longer returned by the watcher.
    Deleted,
}

impl RevisionState {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for RevisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RevisionState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "deleted" => Ok(Self::Deleted),
            other => Err(ValidationError::UnknownVariant {
                kind: "revision state",
                value: other.to_string(),
            }),
        }
    }
}

/// An immutable snapshot of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRevision {
    /// Unique revision identifier.
    pub id: Uuid,
    /// Owning account name.
    pub account: String,
    /// Owning technology name.
    pub technology: String,
    /// Natural key of the resource.
    pub resource_key: String,
    /// Live or tombstone.
    pub state: RevisionState,
    /// The representation as collected (ephemeral fields included).
    pub config: serde_json::Value,
    /// Hex SHA-256 of the canonical representation, ephemeral fields removed.
    pub digest: String,
    /// When the watcher produced this state.
    pub observed_at: DateTime<Utc>,
}

impl ItemRevision {
    /// A live revision for a collected item.
    pub fn observed(
        pair: &Pair,
        item: CollectedItem,
        digest: String,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account: pair.account.clone(),
            technology: pair.technology.clone(),
            resource_key: item.resource_key,
            state: RevisionState::Active,
            config: item.config,
            digest,
            observed_at,
        }
    }

    /// A tombstone following `previous`. The last known representation is
    /// carried forward so the deletion record is self-describing.
    pub fn tombstone(previous: &ItemRevision, observed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account: previous.account.clone(),
            technology: previous.technology.clone(),
            resource_key: previous.resource_key.clone(),
            state: RevisionState::Deleted,
            config: previous.config.clone(),
            digest: previous.digest.clone(),
            observed_at,
        }
    }

    /// Whether the resource is live in this revision.
    pub fn is_active(&self) -> bool {
        self.state == RevisionState::Active
    }

    /// The pair this revision belongs to.
    pub fn pair(&self) -> Pair {
        Pair::new(self.account.clone(), self.technology.clone())
    }
}
