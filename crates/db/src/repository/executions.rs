//! Execution repository functions (spec §4.1).

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowExecutionRow, DbError};

/// Create a new workflow execution in `pending` status.
///
/// If `idempotency_key` is `Some` and already identifies an execution, the
/// prior row is returned wrapped in [`DbError::AlreadyExists`] instead of a
/// new row being created (P4).
pub async fn create_execution(
    pool: &PgPool,
    workflow_id: Uuid,
    user_id: Uuid,
    input: serde_json::Value,
    idempotency_key: Option<&str>,
) -> Result<WorkflowExecutionRow, DbError> {
    if let Some(key) = idempotency_key {
        if let Some(existing) = find_by_idempotency_key(pool, key).await? {
            return Err(DbError::AlreadyExists(Box::new(existing)));
        }
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as::<_, WorkflowExecutionRow>(
        r#"
        INSERT INTO workflow_executions
            (id, workflow_id, user_id, status, input, output, error, attempt_count, idempotency_key, cancel_requested, started_at, finished_at)
        VALUES ($1, $2, $3, 'pending', $4, NULL, NULL, 0, $5, FALSE, $6, NULL)
        RETURNING id, workflow_id, user_id, status, input, output, error, attempt_count, idempotency_key, cancel_requested, started_at, finished_at
        "#,
    )
    .bind(id)
    .bind(workflow_id)
    .bind(user_id)
    .bind(input)
    .bind(idempotency_key)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Look up a prior execution by its idempotency key, if any.
pub async fn find_by_idempotency_key(
    pool: &PgPool,
    idempotency_key: &str,
) -> Result<Option<WorkflowExecutionRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowExecutionRow>(
        r#"SELECT id, workflow_id, user_id, status, input, output, error, attempt_count, idempotency_key, cancel_requested, started_at, finished_at
           FROM workflow_executions WHERE idempotency_key = $1"#,
    )
    .bind(idempotency_key)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetch a single execution by id.
pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<WorkflowExecutionRow, DbError> {
    sqlx::query_as::<_, WorkflowExecutionRow>(
        r#"SELECT id, workflow_id, user_id, status, input, output, error, attempt_count, idempotency_key, cancel_requested, started_at, finished_at
           FROM workflow_executions WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Request cancellation of a running/paused/pending execution (spec §4.6).
/// Sets the `cancel_requested` flag rather than `status` so the executor
/// (polling this flag every readiness iteration) is the only thing that
/// ever decides the terminal status. Refuses once the execution is already
/// terminal (`DbError::NotFound`, mapped to 409 by callers).
pub async fn request_cancel(pool: &PgPool, execution_id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_executions
        SET cancel_requested = TRUE
        WHERE id = $1
          AND status NOT IN ('completed', 'failed')
        "#,
    )
    .bind(execution_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Patch applied when transitioning an execution's status.
#[derive(Debug, Default, Clone)]
pub struct StatusPatch {
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub finished: bool,
}

/// Update the status of a workflow execution with a compare-and-set guard:
/// the row is only updated while its current status is not already
/// terminal (`completed` or `failed`), per P1. `running -> paused -> running`
/// cycles are allowed since neither is terminal.
///
/// Returns `DbError::NotFound` if no row matched (either missing or already
/// terminal).
pub async fn update_execution_status(
    pool: &PgPool,
    execution_id: Uuid,
    status: &str,
    patch: StatusPatch,
) -> Result<(), DbError> {
    let finished_at = patch.finished.then(Utc::now);

    let result = sqlx::query(
        r#"
        UPDATE workflow_executions
        SET status = $1,
            output = COALESCE($2, output),
            error = COALESCE($3, error),
            finished_at = COALESCE($4, finished_at)
        WHERE id = $5
          AND status NOT IN ('completed', 'failed')
        "#,
    )
    .bind(status)
    .bind(patch.output)
    .bind(patch.error)
    .bind(finished_at)
    .bind(execution_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Increment `attempt_count` by one (called on every queue-level redelivery).
pub async fn increment_attempt_count(pool: &PgPool, execution_id: Uuid) -> Result<(), DbError> {
    sqlx::query("UPDATE workflow_executions SET attempt_count = attempt_count + 1 WHERE id = $1")
        .bind(execution_id)
        .execute(pool)
        .await?;
    Ok(())
}
