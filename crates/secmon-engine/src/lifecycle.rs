//! # Account Lifecycle
//!
//! Creating, updating, enabling and disabling accounts. Accounts are never
//! deleted here; disabling only clears `active`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secmon_core::AccountSpec;
use secmon_store::Datastore;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AdminError;

/// What an upsert or register call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// A new account was created.
    Created,
    /// An existing account was changed.
    Updated,
    /// The stored account already matched.
    Unchanged,
    /// The account exists and overwriting was not requested.
    AlreadyExists,
}

/// Result of a bulk activation change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Accounts whose flag was flipped.
    pub changed: Vec<String>,
    /// Accounts already in the requested state.
    pub unchanged: Vec<String>,
    /// Names with no matching account.
    pub unknown: Vec<String>,
}

/// Account administration over the store.
#[derive(Clone)]
pub struct AccountLifecycleManager {
    store: Arc<dyn Datastore>,
}

impl AccountLifecycleManager {
    /// Create a manager over `store`.
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Set `active` on every named account. Unknown names are reported,
    /// not rejected.
    pub async fn set_active(
        &self,
        names: &[String],
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<ActivationReport, AdminError> {
        let mut report = ActivationReport::default();
        for name in names {
            let Some(mut account) = self.store.account_by_name(name).await? else {
                warn!(account = %name, "No such account; ignoring");
                report.unknown.push(name.clone());
                continue;
            };
            if account.active == active {
                report.unchanged.push(name.clone());
                continue;
            }
            account.active = active;
            account.updated_at = now;
            self.store.upsert_account(&account).await?;
            info!(account = %name, active, "Account activation changed");
            report.changed.push(name.clone());
        }
        Ok(report)
    }

    /// Create or update the account keyed by `spec.identifier`. Repeating
    /// the same call is a no-op.
    pub async fn upsert(
        &self,
        spec: AccountSpec,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, AdminError> {
        self.register(spec, true, now).await
    }

    /// Create the account if absent. An existing account is only updated
    /// when `overwrite` is set.
    pub async fn register(
        &self,
        spec: AccountSpec,
        overwrite: bool,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, AdminError> {
        spec.validate()?;
        let existing = self.store.account_by_identifier(&spec.identifier).await?;
        let (account, outcome) = match existing {
            None => (spec.into_account(now), UpsertOutcome::Created),
            Some(existing) if existing.matches(&spec) => return Ok(UpsertOutcome::Unchanged),
            Some(_) if !overwrite => return Ok(UpsertOutcome::AlreadyExists),
            Some(existing) => (spec.apply_to(&existing, now), UpsertOutcome::Updated),
        };
        self.store.upsert_account(&account).await?;
        info!(
            identifier = %account.identifier,
            account = %account.name,
            outcome = ?outcome,
            "Account saved"
        );
        Ok(outcome)
    }
}
