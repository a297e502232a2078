//! Storage layer for the adaptive learning engine backend: typed Postgres
//! access via `sqlx`, one repository per aggregate (§3), plus the retry
//! helper backing the transaction-conflict policy in §4.7.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod question_repository;
pub mod quota_repository;
pub mod response_repository;
pub mod retry;
pub mod review_repository;
pub mod session_repository;
pub mod snapshot_repository;
pub mod tier_config_repository;
pub mod user_repository;

pub use error::StorageError;
pub use question_repository::QuestionRepository;
pub use quota_repository::{QuotaDecision, QuotaRepository};
pub use response_repository::ResponseRepository;
pub use review_repository::ReviewIntervalRepository;
pub use session_repository::SessionRepository;
pub use snapshot_repository::SnapshotRepository;
pub use tier_config_repository::{TierConfigRepository, TierConfigRow};
pub use user_repository::{ProficiencyUpdate, UserRepository, UserRow};

/// Create a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(StorageError::Connection)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(StorageError::Migration)
}

/// Check database connectivity.
pub async fn check_connection(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(StorageError::Query)?;
    Ok(())
}
