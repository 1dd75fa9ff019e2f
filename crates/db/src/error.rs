//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Returned by `executions::create_execution` when the supplied
    /// `idempotencyKey` already identifies an existing execution (P4). The
    /// caller gets the prior row back instead of a hard error.
    #[error("execution already exists for this idempotency key")]
    AlreadyExists(Box<crate::models::WorkflowExecutionRow>),
}
