//! Workflow CRUD operations.
//!
//! Authoring (the visual builder, versioning UI) is out of scope (spec §1);
//! these functions exist so the engine and its tests have a canonical way
//! to persist and load the graph the executor runs.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::WorkflowRow, DbError};

/// Insert a new workflow into the database.
///
/// `definition` must be a valid JSON object produced by serialising the
/// domain `Workflow` type from the `engine` crate.
pub async fn create_workflow(
    pool: &PgPool,
    owner_user_id: Uuid,
    name: &str,
    definition: serde_json::Value,
) -> Result<WorkflowRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as::<_, WorkflowRow>(
        r#"
        INSERT INTO workflows (id, owner_user_id, name, definition, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 1, $5, $5)
        RETURNING id, owner_user_id, name, definition, version, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(owner_user_id)
    .bind(name)
    .bind(definition)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(
        r#"SELECT id, owner_user_id, name, definition, version, created_at, updated_at
           FROM workflows WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Return workflows owned by `owner_user_id`, newest first.
pub async fn list_workflows(pool: &PgPool, owner_user_id: Uuid) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(
        r#"SELECT id, owner_user_id, name, definition, version, created_at, updated_at
           FROM workflows WHERE owner_user_id = $1 ORDER BY created_at DESC"#,
    )
    .bind(owner_user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Permanently delete a workflow by its primary key.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
