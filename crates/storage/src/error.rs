//! Storage errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    #[error("Query error: {0}")]
    Query(#[source] sqlx::Error),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl StorageError {
    /// Postgres serialization failure / deadlock (40001/40P01), or pool
    /// exhaustion, are safe to retry per the backoff policy in `retry`.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Query(e) | StorageError::Connection(e) => sqlx_is_retryable(e),
            StorageError::Migration(_) | StorageError::Invariant(_) => false,
        }
    }
}

pub(crate) fn sqlx_is_retryable(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Query(err)
    }
}

impl From<StorageError> for ascent_domain::DomainError {
    fn from(err: StorageError) -> Self {
        use ascent_domain::DomainError;
        match err {
            StorageError::Query(e) | StorageError::Connection(e) => DomainError::from(e),
            StorageError::Migration(e) => DomainError::Fatal(e.to_string()),
            StorageError::Invariant(msg) => DomainError::Fatal(msg),
        }
    }
}
