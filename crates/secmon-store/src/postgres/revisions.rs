//! Item revision persistence on the append-only `item_revisions` table.

use chrono::{DateTime, Utc};
use secmon_core::{ItemRevision, Pair, RevisionState};
use sqlx::PgPool;
use uuid::Uuid;

use crate::StoreError;

/// Newest revision of every resource of a pair, tombstones included.
pub async fn latest(pool: &PgPool, pair: &Pair) -> Result<Vec<ItemRevision>, StoreError> {
    let rows = sqlx::query_as::<_, RevisionRow>(
        "SELECT DISTINCT ON (resource_key)
                id, account, technology, resource_key, state, config, digest, observed_at
         FROM item_revisions
         WHERE account = $1 AND technology = $2
         ORDER BY resource_key, seq DESC",
    )
    .bind(&pair.account)
    .bind(&pair.technology)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(RevisionRow::into_revision).collect()
}

/// Every revision of one resource, oldest first.
pub async fn history(
    pool: &PgPool,
    pair: &Pair,
    resource_key: &str,
) -> Result<Vec<ItemRevision>, StoreError> {
    let rows = sqlx::query_as::<_, RevisionRow>(
        "SELECT id, account, technology, resource_key, state, config, digest, observed_at
         FROM item_revisions
         WHERE account = $1 AND technology = $2 AND resource_key = $3
         ORDER BY seq",
    )
    .bind(&pair.account)
    .bind(&pair.technology)
    .bind(resource_key)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(RevisionRow::into_revision).collect()
}

/// Append revisions in one transaction, preserving slice order.
pub async fn append(pool: &PgPool, revisions: &[ItemRevision]) -> Result<(), StoreError> {
    if revisions.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    for rev in revisions {
        sqlx::query(
            "INSERT INTO item_revisions
                 (id, account, technology, resource_key, state, config, digest, observed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(rev.id)
        .bind(&rev.account)
        .bind(&rev.technology)
        .bind(&rev.resource_key)
        .bind(rev.state.as_str())
        .bind(&rev.config)
        .bind(&rev.digest)
        .bind(rev.observed_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct RevisionRow {
    id: Uuid,
    account: String,
    technology: String,
    resource_key: String,
    state: String,
    config: serde_json::Value,
    digest: String,
    observed_at: DateTime<Utc>,
}

impl RevisionRow {
    fn into_revision(self) -> Result<ItemRevision, StoreError> {
        let state: RevisionState = self
            .state
            .parse()
            .map_err(|e| StoreError::corrupt("item_revisions", e))?;
        Ok(ItemRevision {
            id: self.id,
            account: self.account,
            technology: self.technology,
            resource_key: self.resource_key,
            state,
            config: self.config,
            digest: self.digest,
            observed_at: self.observed_at,
        })
    }
}
