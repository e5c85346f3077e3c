//! Last-run persistence on the `last_runs` table.

use chrono::{DateTime, Utc};
use secmon_core::{LastRun, Pair, RunOutcome};
use sqlx::PgPool;

use crate::StoreError;

const COLUMNS: &str =
    "account, technology, finished_at, outcome, consecutive_failures, needs_attention, last_error";

/// The last completed run of a pair.
pub async fn get(pool: &PgPool, pair: &Pair) -> Result<Option<LastRun>, StoreError> {
    let row = sqlx::query_as::<_, LastRunRow>(&format!(
        "SELECT {COLUMNS} FROM last_runs WHERE account = $1 AND technology = $2"
    ))
    .bind(&pair.account)
    .bind(&pair.technology)
    .fetch_optional(pool)
    .await?;
    row.map(LastRunRow::into_last_run).transpose()
}

/// Every last-run record, ordered by pair.
pub async fn list(pool: &PgPool) -> Result<Vec<LastRun>, StoreError> {
    let rows = sqlx::query_as::<_, LastRunRow>(&format!(
        "SELECT {COLUMNS} FROM last_runs ORDER BY account, technology"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(LastRunRow::into_last_run).collect()
}

/// Replace the last-run record of a pair.
pub async fn upsert(pool: &PgPool, run: &LastRun) -> Result<(), StoreError> {
    let failures = i32::try_from(run.consecutive_failures).unwrap_or(i32::MAX);
    sqlx::query(
        "INSERT INTO last_runs (account, technology, finished_at, outcome,
                                consecutive_failures, needs_attention, last_error)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (account, technology) DO UPDATE SET
             finished_at = EXCLUDED.finished_at,
             outcome = EXCLUDED.outcome,
             consecutive_failures = EXCLUDED.consecutive_failures,
             needs_attention = EXCLUDED.needs_attention,
             last_error = EXCLUDED.last_error",
    )
    .bind(&run.pair.account)
    .bind(&run.pair.technology)
    .bind(run.finished_at)
    .bind(run.outcome.as_str())
    .bind(failures)
    .bind(run.needs_attention)
    .bind(&run.last_error)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct LastRunRow {
    account: String,
    technology: String,
    finished_at: DateTime<Utc>,
    outcome: String,
    consecutive_failures: i32,
    needs_attention: bool,
    last_error: Option<String>,
}

impl LastRunRow {
    fn into_last_run(self) -> Result<LastRun, StoreError> {
        let outcome: RunOutcome = self
            .outcome
            .parse()
            .map_err(|e| StoreError::corrupt("last_runs", e))?;
        let consecutive_failures = u32::try_from(self.consecutive_failures)
            .map_err(|e| StoreError::corrupt("last_runs", e))?;
        Ok(LastRun {
            pair: Pair::new(self.account, self.technology),
            finished_at: self.finished_at,
            outcome,
            consecutive_failures,
            needs_attention: self.needs_attention,
            last_error: self.last_error,
        })
    }
}
