//! Store error type.

use thiserror::Error;

/// Errors returned by [`crate::Datastore`] implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database driver failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedded migrations could not be applied.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A write would break a uniqueness guarantee.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt {table} row: {reason}")]
    Corrupt {
        /// Table the row came from.
        table: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

impl StoreError {
    /// Build a [`StoreError::Corrupt`].
    pub fn corrupt(table: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            table,
            reason: reason.to_string(),
        }
    }

    /// Map a driver error, turning unique-constraint violations into
    /// [`StoreError::Conflict`].
    pub(crate) fn from_write(err: sqlx::Error, what: &str) -> Self {
        let unique_violation = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code == "23505")
            .unwrap_or(false);
        if unique_violation {
            Self::Conflict(format!("{what}: {err}"))
        } else {
            Self::Database(err)
        }
    }
}
