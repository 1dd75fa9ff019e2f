//! Usage counter repository functions (spec §3/§4.1).
//!
//! `increment_usage` is the only write path and is a single atomic
//! upsert, so concurrent dispatchers admitting executions for the same
//! subscription never lose an increment.

use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Atomically add `delta` to the (subscription, resource, period) counter,
/// creating the row if it doesn't exist yet, and return the new total.
pub async fn increment_usage(
    pool: &PgPool,
    subscription_id: Uuid,
    resource_type: &str,
    period: &str,
    delta: i64,
) -> Result<i64, DbError> {
    let (quantity,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO usage_logs (subscription_id, resource_type, period, quantity)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (subscription_id, resource_type, period)
        DO UPDATE SET quantity = usage_logs.quantity + EXCLUDED.quantity
        RETURNING quantity
        "#,
    )
    .bind(subscription_id)
    .bind(resource_type)
    .bind(period)
    .bind(delta)
    .fetch_one(pool)
    .await?;

    Ok(quantity)
}

/// Read the current counter for a (subscription, resource, period), or 0.
pub async fn get_usage(
    pool: &PgPool,
    subscription_id: Uuid,
    resource_type: &str,
    period: &str,
) -> Result<i64, DbError> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"SELECT quantity FROM usage_logs WHERE subscription_id = $1 AND resource_type = $2 AND period = $3"#,
    )
    .bind(subscription_id)
    .bind(resource_type)
    .bind(period)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(q,)| q).unwrap_or(0))
}
