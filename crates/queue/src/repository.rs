//! Durable bus operations against the `job_queue` table.
//!
//! Polling uses `SELECT ... FOR UPDATE SKIP LOCKED` (the `db` crate's
//! original job-queue idiom) combined with a lease: a claimed row is
//! marked `leased_until` rather than deleted, so a worker that crashes
//! mid-processing leaves the job visible again once the lease expires —
//! this is what makes redelivery at-least-once instead of at-most-once.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use db::DbPool;
use sqlx::FromRow;
use uuid::Uuid;

use crate::envelope::{Envelope, JobKind};
use crate::error::QueueError;

#[derive(Debug, Clone, FromRow)]
struct JobRow {
    id: Uuid,
    execution_id: Uuid,
    workflow_id: Uuid,
    user_id: Uuid,
    kind: String,
    attempt: i32,
    payload: serde_json::Value,
    enqueued_at: DateTime<Utc>,
}

impl JobRow {
    fn into_envelope(self) -> Result<Envelope, QueueError> {
        let kind: JobKind = self
            .kind
            .parse()
            .map_err(|e: String| QueueError::Sqlx(sqlx::Error::Decode(e.into())))?;
        Ok(Envelope {
            v: 1,
            job_id: self.id,
            kind,
            execution_id: self.execution_id,
            workflow_id: self.workflow_id,
            user_id: self.user_id,
            attempt: self.attempt as u32,
            enqueued_at: self.enqueued_at,
            payload: self.payload,
        })
    }
}

/// A job claimed from the bus, ready to hand to the executor.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job_id: Uuid,
    pub envelope: Envelope,
}

/// Publish an envelope onto the primary channel.
pub async fn publish_primary(pool: &DbPool, envelope: &Envelope) -> Result<(), QueueError> {
    insert(pool, "primary", envelope, Utc::now()).await
}

/// Publish an envelope onto the retry channel, visible again after `delay`.
pub async fn publish_retry(
    pool: &DbPool,
    envelope: &Envelope,
    delay: std::time::Duration,
) -> Result<(), QueueError> {
    let visible_at = Utc::now() + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero());
    insert(pool, "retry", envelope, visible_at).await
}

/// Publish an envelope onto the dead-letter channel, preserving the
/// original envelope plus the failure context (spec §6).
pub async fn publish_dead_letter(
    pool: &DbPool,
    envelope: &Envelope,
    failure_reason: &str,
    last_error: &str,
) -> Result<(), QueueError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO job_queue
            (id, channel, execution_id, workflow_id, user_id, kind, attempt, payload,
             failure_reason, last_error, enqueued_at, visible_at, leased_until, updated_at)
        VALUES ($1, 'dead_letter', $2, $3, $4, $5, $6, $7, $8, $9, $10, $10, NULL, $10)
        "#,
    )
    .bind(id)
    .bind(envelope.execution_id)
    .bind(envelope.workflow_id)
    .bind(envelope.user_id)
    .bind(envelope.kind.to_string())
    .bind(envelope.attempt as i32)
    .bind(&envelope.payload)
    .bind(failure_reason)
    .bind(last_error)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

async fn insert(
    pool: &DbPool,
    channel: &str,
    envelope: &Envelope,
    visible_at: DateTime<Utc>,
) -> Result<(), QueueError> {
    sqlx::query(
        r#"
        INSERT INTO job_queue
            (id, channel, execution_id, workflow_id, user_id, kind, attempt, payload,
             enqueued_at, visible_at, leased_until, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL, $9)
        "#,
    )
    .bind(envelope.job_id)
    .bind(channel)
    .bind(envelope.execution_id)
    .bind(envelope.workflow_id)
    .bind(envelope.user_id)
    .bind(envelope.kind.to_string())
    .bind(envelope.attempt as i32)
    .bind(&envelope.payload)
    .bind(envelope.enqueued_at)
    .bind(visible_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Atomically claim the oldest visible job from the primary or retry
/// channel and lease it for `lease` before another poller can see it again.
pub async fn claim_next(
    pool: &DbPool,
    lease: std::time::Duration,
) -> Result<Option<ClaimedJob>, QueueError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, execution_id, workflow_id, user_id, kind, attempt, payload, enqueued_at
        FROM job_queue
        WHERE channel IN ('primary', 'retry')
          AND visible_at <= now()
          AND (leased_until IS NULL OR leased_until <= now())
        ORDER BY visible_at ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(None);
    };

    let leased_until = Utc::now() + ChronoDuration::from_std(lease).unwrap_or(ChronoDuration::zero());
    sqlx::query("UPDATE job_queue SET leased_until = $1, updated_at = now() WHERE id = $2")
        .bind(leased_until)
        .bind(row.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let job_id = row.id;
    Ok(Some(ClaimedJob {
        job_id,
        envelope: row.into_envelope()?,
    }))
}

/// Acknowledge successful processing: remove the job from the bus entirely.
/// Spec §4.2: ack only after the executor reached terminal/paused, or
/// scheduled the next redelivery (which itself inserts a fresh row, see
/// [`publish_retry`]/[`publish_dead_letter`]).
pub async fn ack(pool: &DbPool, job_id: Uuid) -> Result<(), QueueError> {
    sqlx::query("DELETE FROM job_queue WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}
