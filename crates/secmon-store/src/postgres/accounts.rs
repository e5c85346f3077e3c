//! Account persistence on the `accounts` table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use secmon_core::Account;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::StoreError;

const COLUMNS: &str = "identifier, name, account_type, active, third_party, notes, \
                       custom_fields, created_at, updated_at";

/// All accounts ordered by name.
pub async fn list(pool: &PgPool) -> Result<Vec<Account>, StoreError> {
    let rows = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {COLUMNS} FROM accounts ORDER BY name"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(AccountRow::into_account).collect())
}

/// Fetch an account by display name.
pub async fn by_name(pool: &PgPool, name: &str) -> Result<Option<Account>, StoreError> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {COLUMNS} FROM accounts WHERE name = $1"
    ))
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(AccountRow::into_account))
}

/// Fetch an account by external identifier.
pub async fn by_identifier(pool: &PgPool, identifier: &str) -> Result<Option<Account>, StoreError> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {COLUMNS} FROM accounts WHERE identifier = $1"
    ))
    .bind(identifier)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(AccountRow::into_account))
}

/// Insert or replace an account keyed by identifier.
pub async fn upsert(pool: &PgPool, account: &Account) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO accounts (identifier, name, account_type, active, third_party, notes,
                               custom_fields, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (identifier) DO UPDATE SET
             name = EXCLUDED.name,
             account_type = EXCLUDED.account_type,
             active = EXCLUDED.active,
             third_party = EXCLUDED.third_party,
             notes = EXCLUDED.notes,
             custom_fields = EXCLUDED.custom_fields,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(&account.identifier)
    .bind(&account.name)
    .bind(&account.account_type)
    .bind(account.active)
    .bind(account.third_party)
    .bind(&account.notes)
    .bind(Json(&account.custom_fields))
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(pool)
    .await
    .map_err(|e| StoreError::from_write(e, "account name already in use"))?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    identifier: String,
    name: String,
    account_type: String,
    active: bool,
    third_party: bool,
    notes: String,
    custom_fields: Json<BTreeMap<String, String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self) -> Account {
        Account {
            identifier: self.identifier,
            name: self.name,
            account_type: self.account_type,
            active: self.active,
            third_party: self.third_party,
            notes: self.notes,
            custom_fields: self.custom_fields.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
