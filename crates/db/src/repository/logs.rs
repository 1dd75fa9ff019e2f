//! Append-only execution log repository functions (spec §3/§4.1).

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::ExecutionLogRow, DbError};

/// Append a single structured log line.
///
/// Callers are responsible for bounding how many of these they fire per
/// node (the store never blocks the executor on a slow writer beyond the
/// caller's own buffer, per spec §4.1).
pub async fn append_log(
    pool: &PgPool,
    execution_id: Uuid,
    node_id: Option<&str>,
    level: &str,
    message: &str,
    metadata: serde_json::Value,
) -> Result<ExecutionLogRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as::<_, ExecutionLogRow>(
        r#"
        INSERT INTO execution_logs (id, execution_id, node_id, level, message, metadata, "timestamp")
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, execution_id, node_id, level, message, metadata, "timestamp"
        "#,
    )
    .bind(id)
    .bind(execution_id)
    .bind(node_id)
    .bind(level)
    .bind(message)
    .bind(metadata)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Return the most recent `limit` log lines for an execution, oldest first.
pub async fn tail_logs(
    pool: &PgPool,
    execution_id: Uuid,
    limit: i64,
) -> Result<Vec<ExecutionLogRow>, DbError> {
    let mut rows = sqlx::query_as::<_, ExecutionLogRow>(
        r#"
        SELECT id, execution_id, node_id, level, message, metadata, "timestamp"
        FROM execution_logs
        WHERE execution_id = $1
        ORDER BY "timestamp" DESC
        LIMIT $2
        "#,
    )
    .bind(execution_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.reverse();
    Ok(rows)
}
