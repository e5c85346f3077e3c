//! Exception log persistence on the `exception_logs` table.

use chrono::{DateTime, Utc};
use secmon_core::{ExceptionEntry, ExceptionSource};
use sqlx::PgPool;
use uuid::Uuid;

use crate::StoreError;

/// Append one entry.
pub async fn insert(pool: &PgPool, entry: &ExceptionEntry) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO exception_logs
             (id, source, kind, technology, account, message, occurred_at, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(entry.id)
    .bind(entry.source.as_str())
    .bind(&entry.kind)
    .bind(&entry.technology)
    .bind(&entry.account)
    .bind(&entry.message)
    .bind(entry.occurred_at)
    .bind(entry.expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Newest entries first, at most `limit`.
pub async fn list(pool: &PgPool, limit: usize) -> Result<Vec<ExceptionEntry>, StoreError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = sqlx::query_as::<_, ExceptionRow>(
        "SELECT id, source, kind, technology, account, message, occurred_at, expires_at
         FROM exception_logs ORDER BY occurred_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(ExceptionRow::into_entry).collect()
}

/// Delete entries whose expiry is at or before `now`.
pub async fn purge_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM exception_logs WHERE expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[derive(sqlx::FromRow)]
struct ExceptionRow {
    id: Uuid,
    source: String,
    kind: String,
    technology: Option<String>,
    account: Option<String>,
    message: String,
    occurred_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl ExceptionRow {
    fn into_entry(self) -> Result<ExceptionEntry, StoreError> {
        let source: ExceptionSource = self
            .source
            .parse()
            .map_err(|e| StoreError::corrupt("exception_logs", e))?;
        Ok(ExceptionEntry {
            id: self.id,
            source,
            kind: self.kind,
            technology: self.technology,
            account: self.account,
            message: self.message,
            occurred_at: self.occurred_at,
            expires_at: self.expires_at,
        })
    }
}
