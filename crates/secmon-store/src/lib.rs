//! # secmon-store: Persistence
//!
//! Everything the engine keeps between runs lives behind [`Datastore`]:
//! accounts, technology configs, item revision history, issues with their
//! sub-findings, per-pair last-run records, and the exception log.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: `parking_lot`-guarded maps. Used for development,
//!   single-shot commands without a database, and tests.
//! - [`PgStore`]: PostgreSQL via SQLx with embedded migrations. Selected when
//!   `DATABASE_URL` is set (see [`connect_from_env`]).
//!
//! ## Guarantees every backend provides
//!
//! - At most one open issue per (account, technology, resource key, rule id).
//!   A write that would create a second one fails with
//!   [`StoreError::Conflict`].
//! - Item revisions are append-only.
//! - Audit refreshes and operator justifications touch disjoint fields of
//!   an issue, so neither can undo the other.
//! - Deleting unjustified issues removes their sub-findings in the same
//!   atomic step.

#![deny(missing_docs)]

pub mod error;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secmon_core::{
    Account, ExceptionEntry, Issue, IssueStatus, ItemRevision, LastRun, Pair, TechnologyConfig,
};
use uuid::Uuid;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage operations required by the engine.
///
/// Implementations must be safe to share across concurrently running pairs.
#[async_trait]
pub trait Datastore: Send + Sync {
    // -- Accounts -------------------------------------------------------------

    /// All accounts, ordered by name.
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Look up an account by its display name.
    async fn account_by_name(&self, name: &str) -> Result<Option<Account>, StoreError>;

    /// Look up an account by its external identifier.
    async fn account_by_identifier(&self, identifier: &str)
        -> Result<Option<Account>, StoreError>;

    /// Insert or replace the account with `account.identifier`.
    ///
    /// Fails with [`StoreError::Conflict`] if another identifier already uses
    /// `account.name`.
    async fn upsert_account(&self, account: &Account) -> Result<(), StoreError>;

    // -- Technology configs ---------------------------------------------------

    /// The stored config for one technology.
    async fn technology_config(&self, name: &str) -> Result<Option<TechnologyConfig>, StoreError>;

    /// All stored technology configs, ordered by name.
    async fn list_technology_configs(&self) -> Result<Vec<TechnologyConfig>, StoreError>;

    /// Insert or replace a technology config.
    async fn upsert_technology_config(&self, config: &TechnologyConfig) -> Result<(), StoreError>;

    // -- Item revisions -------------------------------------------------------

    /// The most recent revision of every resource ever seen for `pair`,
    /// tombstones included, ordered by resource key.
    async fn latest_revisions(&self, pair: &Pair) -> Result<Vec<ItemRevision>, StoreError>;

    /// Every revision of one resource, oldest first.
    async fn revision_history(
        &self,
        pair: &Pair,
        resource_key: &str,
    ) -> Result<Vec<ItemRevision>, StoreError>;

    /// Append revisions in order. All or none are written.
    async fn append_revisions(&self, revisions: &[ItemRevision]) -> Result<(), StoreError>;

    // -- Issues ---------------------------------------------------------------

    /// Issues of one pair, optionally restricted to a status.
    async fn issues(
        &self,
        pair: &Pair,
        status: Option<IssueStatus>,
    ) -> Result<Vec<Issue>, StoreError>;

    /// Look up one issue.
    async fn issue(&self, id: Uuid) -> Result<Option<Issue>, StoreError>;

    /// Insert or replace an issue together with its sub-findings.
    async fn upsert_issue(&self, issue: &Issue) -> Result<(), StoreError>;

    /// Write the audit side of an existing issue: auditor, severity,
    /// summary, evidence, sub-findings, status, `last_seen` and `closed_at`.
    /// The stored justification is kept. Returns the issue as stored
    /// afterwards, or `None` when it no longer exists; a missing issue is
    /// never recreated.
    async fn refresh_issue(&self, issue: &Issue) -> Result<Option<Issue>, StoreError>;

    /// Write only the justification fields of an existing issue. Returns the
    /// issue as stored afterwards, or `None` when it no longer exists.
    async fn set_issue_justification(&self, issue: &Issue) -> Result<Option<Issue>, StoreError>;

    /// Delete every unjustified issue of `pair`, open or closed, with its
    /// sub-findings. Returns the number of issues removed.
    async fn delete_unjustified_issues(&self, pair: &Pair) -> Result<u64, StoreError>;

    // -- Last runs ------------------------------------------------------------

    /// The last completed run of a pair.
    async fn last_run(&self, pair: &Pair) -> Result<Option<LastRun>, StoreError>;

    /// Replace the last-run record of `run.pair`.
    async fn record_last_run(&self, run: &LastRun) -> Result<(), StoreError>;

    /// Every last-run record, ordered by pair.
    async fn list_last_runs(&self) -> Result<Vec<LastRun>, StoreError>;

    // -- Exception log --------------------------------------------------------

    /// Append one exception entry.
    async fn append_exception(&self, entry: &ExceptionEntry) -> Result<(), StoreError>;

    /// Exception entries, newest first, at most `limit`.
    async fn list_exceptions(&self, limit: usize) -> Result<Vec<ExceptionEntry>, StoreError>;

    /// Remove every entry whose expiry is at or before `now`. Returns the
    /// number removed.
    async fn purge_expired_exceptions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Open the store selected by the environment.
///
/// With `DATABASE_URL` set, connects to PostgreSQL and applies migrations.
/// Without it, returns an empty [`MemoryStore`] and warns that nothing will
/// survive the process.
pub async fn connect_from_env(max_connections: u32) -> Result<Arc<dyn Datastore>, StoreError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let store = PgStore::connect(&url, max_connections).await?;
            Ok(Arc::new(store))
        }
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set, using the in-memory store. \
                 Nothing will survive this process."
            );
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
