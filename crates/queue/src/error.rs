//! Error type for the queue crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Db(#[from] db::DbError),

    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Returned by [`crate::CircuitBreaker`] while the circuit is open.
    #[error("circuit breaker is open for '{0}'")]
    CircuitOpen(String),
}
