//! Node execution repository functions (spec §3/§4.1).
//!
//! A `(execution_id, node_id, attempt)` triple identifies a single row. The
//! upsert here is what the Handler Runtime calls de-duplicates redelivered
//! start events: a second `start` for the same triple updates the existing
//! `pending`/`running` row in place rather than inserting a duplicate.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::NodeExecutionRow, DbError};

/// Patch applied by an upsert call.
#[derive(Debug, Default, Clone)]
pub struct NodeExecutionPatch {
    pub status: String,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub retry_count: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Insert or update the single row identified by `(execution_id, node_id, attempt)`.
pub async fn upsert_node_execution(
    pool: &PgPool,
    execution_id: Uuid,
    node_id: &str,
    attempt: i32,
    patch: NodeExecutionPatch,
) -> Result<NodeExecutionRow, DbError> {
    let id = Uuid::new_v4();

    let row = sqlx::query_as::<_, NodeExecutionRow>(
        r#"
        INSERT INTO node_executions
            (id, execution_id, node_id, attempt, status, input, output, error, retry_count, started_at, finished_at)
        VALUES ($1, $2, $3, $4, $5, COALESCE($6, '{}'::jsonb), $7, $8, COALESCE($9, 0), $10, $11)
        ON CONFLICT (execution_id, node_id, attempt) DO UPDATE SET
            status = EXCLUDED.status,
            input = COALESCE(EXCLUDED.input, node_executions.input),
            output = COALESCE(EXCLUDED.output, node_executions.output),
            error = COALESCE(EXCLUDED.error, node_executions.error),
            retry_count = COALESCE(EXCLUDED.retry_count, node_executions.retry_count),
            started_at = COALESCE(node_executions.started_at, EXCLUDED.started_at),
            finished_at = COALESCE(EXCLUDED.finished_at, node_executions.finished_at)
        RETURNING id, execution_id, node_id, attempt, status, input, output, error, retry_count, started_at, finished_at
        "#,
    )
    .bind(id)
    .bind(execution_id)
    .bind(node_id)
    .bind(attempt)
    .bind(&patch.status)
    .bind(patch.input)
    .bind(patch.output)
    .bind(patch.error)
    .bind(patch.retry_count)
    .bind(patch.started_at)
    .bind(patch.finished_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch the latest-attempt row for `(execution_id, node_id)`, if any.
pub async fn get_latest(
    pool: &PgPool,
    execution_id: Uuid,
    node_id: &str,
) -> Result<Option<NodeExecutionRow>, DbError> {
    let row = sqlx::query_as::<_, NodeExecutionRow>(
        r#"
        SELECT id, execution_id, node_id, attempt, status, input, output, error, retry_count, started_at, finished_at
        FROM node_executions
        WHERE execution_id = $1 AND node_id = $2
        ORDER BY attempt DESC
        LIMIT 1
        "#,
    )
    .bind(execution_id)
    .bind(node_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// List every node-execution row for an execution (all attempts), ordered
/// by node id then attempt — used to rebuild the merged node list for
/// `GET /executions/{id}/node-executions`.
pub async fn list_for_execution(
    pool: &PgPool,
    execution_id: Uuid,
) -> Result<Vec<NodeExecutionRow>, DbError> {
    let rows = sqlx::query_as::<_, NodeExecutionRow>(
        r#"
        SELECT id, execution_id, node_id, attempt, status, input, output, error, retry_count, started_at, finished_at
        FROM node_executions
        WHERE execution_id = $1
        ORDER BY node_id, attempt
        "#,
    )
    .bind(execution_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
