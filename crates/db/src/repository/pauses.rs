//! Pause repository functions (spec §3/§4.1).
//!
//! Invariant enforced here: at most one unresumed pause per execution (P6),
//! via the partial unique index `workflow_pauses_unresumed_idx` on
//! `(execution_id) WHERE resumed_at IS NULL` — `create_pause` relies on
//! that constraint and does not re-check application-side, so a redelivered
//! `start` job that re-drives the workflow and hits the same approval node
//! twice fails the second `INSERT` with a unique violation instead of
//! silently creating a second unresumed row. `resolve_pause` is a
//! conditional update guarded by `resumed_at IS NULL` so a redelivered
//! resume job can never double-resume the same pause.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::PauseRow, DbError};

/// Create a new unresumed pause for `(execution_id, node_id)`.
pub async fn create_pause(
    pool: &PgPool,
    execution_id: Uuid,
    node_id: &str,
) -> Result<PauseRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as::<_, PauseRow>(
        r#"
        INSERT INTO workflow_pauses (id, execution_id, node_id, created_at, resumed_at, resume_data)
        VALUES ($1, $2, $3, $4, NULL, NULL)
        RETURNING id, execution_id, node_id, created_at, resumed_at, resume_data
        "#,
    )
    .bind(id)
    .bind(execution_id)
    .bind(node_id)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Find the latest unresumed pause for an execution, if any.
pub async fn find_latest_unresumed(
    pool: &PgPool,
    execution_id: Uuid,
) -> Result<Option<PauseRow>, DbError> {
    let row = sqlx::query_as::<_, PauseRow>(
        r#"
        SELECT id, execution_id, node_id, created_at, resumed_at, resume_data
        FROM workflow_pauses
        WHERE execution_id = $1 AND resumed_at IS NULL
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(execution_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Mark a pause as resumed, storing the caller-supplied `resume_data`.
///
/// Returns `DbError::NotFound` if the pause was already resumed or does
/// not exist.
pub async fn resolve_pause(
    pool: &PgPool,
    pause_id: Uuid,
    resume_data: serde_json::Value,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_pauses
        SET resumed_at = $1, resume_data = $2
        WHERE id = $3 AND resumed_at IS NULL
        "#,
    )
    .bind(Utc::now())
    .bind(resume_data)
    .bind(pause_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
