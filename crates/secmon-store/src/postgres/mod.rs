//! # PostgreSQL Store
//!
//! [`PgStore`] persists everything through SQLx. Queries are grouped by table
//! in the submodules; each function takes a `&PgPool` so it can be called
//! directly from tests or maintenance scripts.
//!
//! Enumerations are stored as their `as_str` form and parsed back on read;
//! a value that no longer parses surfaces as [`StoreError::Corrupt`].

pub mod accounts;
pub mod exceptions;
pub mod issues;
pub mod revisions;
pub mod runs;
pub mod technologies;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secmon_core::{
    Account, ExceptionEntry, Issue, IssueStatus, ItemRevision, LastRun, Pair, TechnologyConfig,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::{Datastore, StoreError};

/// PostgreSQL-backed [`Datastore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to `url` and apply embedded migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        tracing::info!("Connected to PostgreSQL");

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");

        Ok(Self { pool })
    }

    /// Wrap an existing pool. Migrations are not run.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Datastore for PgStore {
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        accounts::list(&self.pool).await
    }

    async fn account_by_name(&self, name: &str) -> Result<Option<Account>, StoreError> {
        accounts::by_name(&self.pool, name).await
    }

    async fn account_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<Account>, StoreError> {
        accounts::by_identifier(&self.pool, identifier).await
    }

    async fn upsert_account(&self, account: &Account) -> Result<(), StoreError> {
        accounts::upsert(&self.pool, account).await
    }

    async fn technology_config(
        &self,
        name: &str,
    ) -> Result<Option<TechnologyConfig>, StoreError> {
        technologies::get(&self.pool, name).await
    }

    async fn list_technology_configs(&self) -> Result<Vec<TechnologyConfig>, StoreError> {
        technologies::list(&self.pool).await
    }

    async fn upsert_technology_config(&self, config: &TechnologyConfig) -> Result<(), StoreError> {
        technologies::upsert(&self.pool, config).await
    }

    async fn latest_revisions(&self, pair: &Pair) -> Result<Vec<ItemRevision>, StoreError> {
        revisions::latest(&self.pool, pair).await
    }

    async fn revision_history(
        &self,
        pair: &Pair,
        resource_key: &str,
    ) -> Result<Vec<ItemRevision>, StoreError> {
        revisions::history(&self.pool, pair, resource_key).await
    }

    async fn append_revisions(&self, revs: &[ItemRevision]) -> Result<(), StoreError> {
        revisions::append(&self.pool, revs).await
    }

    async fn issues(
        &self,
        pair: &Pair,
        status: Option<IssueStatus>,
    ) -> Result<Vec<Issue>, StoreError> {
        issues::list(&self.pool, pair, status).await
    }

    async fn issue(&self, id: Uuid) -> Result<Option<Issue>, StoreError> {
        issues::get(&self.pool, id).await
    }

    async fn upsert_issue(&self, issue: &Issue) -> Result<(), StoreError> {
        issues::upsert(&self.pool, issue).await
    }

    async fn refresh_issue(&self, issue: &Issue) -> Result<Option<Issue>, StoreError> {
        issues::refresh(&self.pool, issue).await
    }

    async fn set_issue_justification(&self, issue: &Issue) -> Result<Option<Issue>, StoreError> {
        issues::set_justification(&self.pool, issue).await
    }

    async fn delete_unjustified_issues(&self, pair: &Pair) -> Result<u64, StoreError> {
        issues::delete_unjustified(&self.pool, pair).await
    }

    async fn last_run(&self, pair: &Pair) -> Result<Option<LastRun>, StoreError> {
        runs::get(&self.pool, pair).await
    }

    async fn record_last_run(&self, run: &LastRun) -> Result<(), StoreError> {
        runs::upsert(&self.pool, run).await
    }

    async fn list_last_runs(&self) -> Result<Vec<LastRun>, StoreError> {
        runs::list(&self.pool).await
    }

    async fn append_exception(&self, entry: &ExceptionEntry) -> Result<(), StoreError> {
        exceptions::insert(&self.pool, entry).await
    }

    async fn list_exceptions(&self, limit: usize) -> Result<Vec<ExceptionEntry>, StoreError> {
        exceptions::list(&self.pool, limit).await
    }

    async fn purge_expired_exceptions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        exceptions::purge_expired(&self.pool, now).await
    }
}
