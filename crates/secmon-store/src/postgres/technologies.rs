//! Technology config persistence on the `technology_configs` table.

use secmon_core::{PollingInterval, TechnologyConfig};
use sqlx::PgPool;

use crate::StoreError;

/// Fetch one technology config.
pub async fn get(pool: &PgPool, name: &str) -> Result<Option<TechnologyConfig>, StoreError> {
    let row = sqlx::query_as::<_, TechnologyRow>(
        "SELECT name, interval_minutes, active FROM technology_configs WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    row.map(TechnologyRow::into_config).transpose()
}

/// All technology configs ordered by name.
pub async fn list(pool: &PgPool) -> Result<Vec<TechnologyConfig>, StoreError> {
    let rows = sqlx::query_as::<_, TechnologyRow>(
        "SELECT name, interval_minutes, active FROM technology_configs ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(TechnologyRow::into_config).collect()
}

/// Insert or replace a technology config.
pub async fn upsert(pool: &PgPool, config: &TechnologyConfig) -> Result<(), StoreError> {
    let minutes = i32::try_from(config.interval.minutes())
        .map_err(|e| StoreError::corrupt("technology_configs", e))?;
    sqlx::query(
        "INSERT INTO technology_configs (name, interval_minutes, active)
         VALUES ($1, $2, $3)
         ON CONFLICT (name) DO UPDATE SET
             interval_minutes = EXCLUDED.interval_minutes,
             active = EXCLUDED.active",
    )
    .bind(&config.name)
    .bind(minutes)
    .bind(config.active)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct TechnologyRow {
    name: String,
    interval_minutes: i32,
    active: bool,
}

impl TechnologyRow {
    fn into_config(self) -> Result<TechnologyConfig, StoreError> {
        let minutes = u32::try_from(self.interval_minutes)
            .map_err(|e| StoreError::corrupt("technology_configs", e))?;
        let interval = PollingInterval::from_minutes(minutes)
            .map_err(|e| StoreError::corrupt("technology_configs", e))?;
        Ok(TechnologyConfig {
            name: self.name,
            interval,
            active: self.active,
        })
    }
}
