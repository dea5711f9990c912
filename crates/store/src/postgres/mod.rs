//! PostgreSQL repositories.
//!
//! Status transitions are single `UPDATE ... WHERE status = <expected>
//! RETURNING` statements; claims pick their row with `FOR UPDATE SKIP
//! LOCKED` so concurrent workers never receive the same record.

mod action;
mod order;
mod ownership;
mod task;
mod transaction;

use sqlx::PgPool;

pub use action::PostgresActionRepository;
pub use order::PostgresOrderRepository;
pub use ownership::PostgresOwnershipInfoRepository;
pub use task::PostgresTaskRepository;
pub use transaction::PostgresTransactionRepository;

use crate::{Result, StoreError};

/// Runs the database migrations.
pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

/// SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION))
}

/// Maps an insert error, turning unique violations into `AlreadyInUse`.
fn map_insert_error(entity: &'static str, err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        let reason = match &err {
            sqlx::Error::Database(db_err) => db_err
                .constraint()
                .map(|c| format!("violates {c}"))
                .unwrap_or_else(|| db_err.message().to_string()),
            _ => err.to_string(),
        };
        return StoreError::already_in_use(entity, reason);
    }
    StoreError::Database(err)
}

fn to_db_count(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Argument(format!("count {value} is too large")))
}

fn from_db_count(value: i32) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidRecord(format!("negative count {value}")))
}

fn to_db_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
