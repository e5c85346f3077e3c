//! # Accounts
//!
//! A monitored cloud account. Accounts are created and updated through the
//! lifecycle manager and are never deleted: disabling one sets
//! `active = false` so its history stays attributable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Account type used when none is given.
pub const DEFAULT_ACCOUNT_TYPE: &str = "AWS";

/// A persisted account record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// External unique key (e.g. the cloud provider account number).
    pub identifier: String,
    /// Display name; unique, and the handle operators select accounts by.
    pub name: String,
    /// Provider tag (e.g. `AWS`).
    pub account_type: String,
    /// Whether the account is scheduled for watching.
    pub active: bool,
    /// Accounts owned by someone else (vendors, partners). Never part of `all`.
    pub third_party: bool,
    /// Free-text operator notes.
    pub notes: String,
    /// Technology-specific settings, e.g. `role_name` or `s3_name`.
    pub custom_fields: BTreeMap<String, String>,
    /// When the record was first created.
    pub created_at: DateTime<Utc>,
    /// When the record was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Whether the mutable fields of this record already equal `spec`.
    pub fn matches(&self, spec: &AccountSpec) -> bool {
        self.identifier == spec.identifier
            && self.name == spec.name
            && self.account_type == spec.account_type
            && self.active == spec.active
            && self.third_party == spec.third_party
            && self.notes == spec.notes
            && self.custom_fields == spec.custom_fields
    }
}

/// The caller-supplied part of an account, used for create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSpec {
    /// External unique key.
    pub identifier: String,
    /// Display name.
    pub name: String,
    /// Provider tag.
    #[serde(default = "default_account_type")]
    pub account_type: String,
    /// Whether the account is active.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Whether the account belongs to a third party.
    #[serde(default)]
    pub third_party: bool,
    /// Free-text notes.
    #[serde(default)]
    pub notes: String,
    /// Technology-specific settings.
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

fn default_account_type() -> String {
    DEFAULT_ACCOUNT_TYPE.to_string()
}

fn default_true() -> bool {
    true
}

impl AccountSpec {
    /// Create an active, first-party spec with no custom fields.
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            account_type: default_account_type(),
            active: true,
            third_party: false,
            notes: String::new(),
            custom_fields: BTreeMap::new(),
        }
    }

    /// Builder: set the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Builder: mark as a third-party account.
    pub fn with_third_party(mut self, third_party: bool) -> Self {
        self.third_party = third_party;
        self
    }

    /// Builder: add a custom field.
    pub fn with_custom_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields.insert(key.into(), value.into());
        self
    }

    /// Reject specs with an empty identifier or name.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.identifier.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier);
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyAccountName);
        }
        Ok(())
    }

    /// Build a fresh record from this spec.
    pub fn into_account(self, now: DateTime<Utc>) -> Account {
        Account {
            identifier: self.identifier,
            name: self.name,
            account_type: self.account_type,
            active: self.active,
            third_party: self.third_party,
            notes: self.notes,
            custom_fields: self.custom_fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply this spec to an existing record, keeping its creation time.
    pub fn apply_to(self, existing: &Account, now: DateTime<Utc>) -> Account {
        Account {
            created_at: existing.created_at,
            ..self.into_account(now)
        }
    }
}
