//! Issue persistence on `issues` and `issue_sub_findings`.
//!
//! An issue and its sub-findings are always written together in one
//! transaction. The partial unique index `issues_one_open_per_key` enforces
//! the single-open-issue guarantee; violating it maps to
//! [`StoreError::Conflict`]. Refreshes and justification edits are narrow
//! `UPDATE`s over disjoint column sets.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use secmon_core::{Issue, IssueStatus, Pair, Severity, SubFinding};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::StoreError;

const COLUMNS: &str = "id, account, technology, resource_key, rule_id, auditor, severity, \
                       summary, evidence, justified, justification, justified_by, \
                       justified_at, status, first_seen, last_seen, closed_at";

/// Issues of one pair, optionally restricted to a status.
pub async fn list(
    pool: &PgPool,
    pair: &Pair,
    status: Option<IssueStatus>,
) -> Result<Vec<Issue>, StoreError> {
    let rows = sqlx::query_as::<_, IssueRow>(&format!(
        "SELECT {COLUMNS} FROM issues
         WHERE account = $1 AND technology = $2 AND ($3::text IS NULL OR status = $3)
         ORDER BY resource_key, rule_id, first_seen"
    ))
    .bind(&pair.account)
    .bind(&pair.technology)
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;
    attach_sub_findings(pool, rows).await
}

/// Fetch one issue with its sub-findings.
pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Issue>, StoreError> {
    let row = sqlx::query_as::<_, IssueRow>(&format!("SELECT {COLUMNS} FROM issues WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Ok(attach_sub_findings(pool, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Insert or replace an issue and its sub-findings atomically.
pub async fn upsert(pool: &PgPool, issue: &Issue) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO issues (id, account, technology, resource_key, rule_id, auditor, severity,
                             summary, evidence, justified, justification, justified_by,
                             justified_at, status, first_seen, last_seen, closed_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
         ON CONFLICT (id) DO UPDATE SET
             auditor = EXCLUDED.auditor,
             severity = EXCLUDED.severity,
             summary = EXCLUDED.summary,
             evidence = EXCLUDED.evidence,
             justified = EXCLUDED.justified,
             justification = EXCLUDED.justification,
             justified_by = EXCLUDED.justified_by,
             justified_at = EXCLUDED.justified_at,
             status = EXCLUDED.status,
             last_seen = EXCLUDED.last_seen,
             closed_at = EXCLUDED.closed_at",
    )
    .bind(issue.id)
    .bind(&issue.account)
    .bind(&issue.technology)
    .bind(&issue.resource_key)
    .bind(&issue.rule_id)
    .bind(&issue.auditor)
    .bind(issue.severity.as_str())
    .bind(&issue.summary)
    .bind(&issue.evidence)
    .bind(issue.justified)
    .bind(&issue.justification)
    .bind(&issue.justified_by)
    .bind(issue.justified_at)
    .bind(issue.status.as_str())
    .bind(issue.first_seen)
    .bind(issue.last_seen)
    .bind(issue.closed_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        StoreError::from_write(
            e,
            &format!(
                "an open issue already exists for {}/{} {}",
                issue.account,
                issue.technology,
                issue.key()
            ),
        )
    })?;

    replace_sub_findings(&mut tx, issue).await?;
    tx.commit().await?;
    Ok(())
}

/// Update the audit columns and sub-findings of an existing issue. The
/// `justified*` columns are not part of the statement.
pub async fn refresh(pool: &PgPool, issue: &Issue) -> Result<Option<Issue>, StoreError> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query_as::<_, IssueRow>(&format!(
        "UPDATE issues SET
             auditor = $2,
             severity = $3,
             summary = $4,
             evidence = $5,
             status = $6,
             last_seen = $7,
             closed_at = $8
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(issue.id)
    .bind(&issue.auditor)
    .bind(issue.severity.as_str())
    .bind(&issue.summary)
    .bind(&issue.evidence)
    .bind(issue.status.as_str())
    .bind(issue.last_seen)
    .bind(issue.closed_at)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| {
        StoreError::from_write(
            e,
            &format!(
                "an open issue already exists for {}/{} {}",
                issue.account,
                issue.technology,
                issue.key()
            ),
        )
    })?;
    let Some(row) = row else {
        return Ok(None);
    };
    replace_sub_findings(&mut tx, issue).await?;
    tx.commit().await?;
    row.into_issue(issue.sub_findings.clone()).map(Some)
}

/// Update only the `justified*` columns of an existing issue.
pub async fn set_justification(pool: &PgPool, issue: &Issue) -> Result<Option<Issue>, StoreError> {
    let row = sqlx::query_as::<_, IssueRow>(&format!(
        "UPDATE issues SET
             justified = $2,
             justification = $3,
             justified_by = $4,
             justified_at = $5
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(issue.id)
    .bind(issue.justified)
    .bind(&issue.justification)
    .bind(&issue.justified_by)
    .bind(issue.justified_at)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => Ok(attach_sub_findings(pool, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

async fn replace_sub_findings(
    tx: &mut Transaction<'_, Postgres>,
    issue: &Issue,
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM issue_sub_findings WHERE issue_id = $1")
        .bind(issue.id)
        .execute(&mut **tx)
        .await?;
    for sub in &issue.sub_findings {
        sqlx::query(
            "INSERT INTO issue_sub_findings (issue_id, resource_key, detail) VALUES ($1, $2, $3)",
        )
        .bind(issue.id)
        .bind(&sub.resource_key)
        .bind(&sub.detail)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Delete unjustified issues of a pair and their sub-findings in one
/// transaction. Returns the number of issues removed.
pub async fn delete_unjustified(pool: &PgPool, pair: &Pair) -> Result<u64, StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "DELETE FROM issue_sub_findings WHERE issue_id IN (
             SELECT id FROM issues
             WHERE account = $1 AND technology = $2 AND justified = FALSE)",
    )
    .bind(&pair.account)
    .bind(&pair.technology)
    .execute(&mut *tx)
    .await?;
    let result = sqlx::query(
        "DELETE FROM issues WHERE account = $1 AND technology = $2 AND justified = FALSE",
    )
    .bind(&pair.account)
    .bind(&pair.technology)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(result.rows_affected())
}

async fn attach_sub_findings(pool: &PgPool, rows: Vec<IssueRow>) -> Result<Vec<Issue>, StoreError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let subs = sqlx::query_as::<_, SubFindingRow>(
        "SELECT issue_id, resource_key, detail FROM issue_sub_findings
         WHERE issue_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<Uuid, BTreeSet<SubFinding>> = HashMap::new();
    for sub in subs {
        grouped
            .entry(sub.issue_id)
            .or_default()
            .insert(SubFinding::new(sub.resource_key, sub.detail));
    }

    rows.into_iter()
        .map(|row| {
            let subs = grouped.remove(&row.id).unwrap_or_default();
            row.into_issue(subs)
        })
        .collect()
}

#[derive(sqlx::FromRow)]
struct IssueRow {
    id: Uuid,
    account: String,
    technology: String,
    resource_key: String,
    rule_id: String,
    auditor: String,
    severity: String,
    summary: String,
    evidence: serde_json::Value,
    justified: bool,
    justification: Option<String>,
    justified_by: Option<String>,
    justified_at: Option<DateTime<Utc>>,
    status: String,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl IssueRow {
    fn into_issue(self, sub_findings: BTreeSet<SubFinding>) -> Result<Issue, StoreError> {
        let severity: Severity = self
            .severity
            .parse()
            .map_err(|e| StoreError::corrupt("issues", e))?;
        let status: IssueStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::corrupt("issues", e))?;
        Ok(Issue {
            id: self.id,
            account: self.account,
            technology: self.technology,
            resource_key: self.resource_key,
            rule_id: self.rule_id,
            auditor: self.auditor,
            severity,
            summary: self.summary,
            evidence: self.evidence,
            justified: self.justified,
            justification: self.justification,
            justified_by: self.justified_by,
            justified_at: self.justified_at,
            sub_findings,
            status,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            closed_at: self.closed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SubFindingRow {
    issue_id: Uuid,
    resource_key: String,
    detail: String,
}
