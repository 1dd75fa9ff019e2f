//! Dispatcher (spec §4.7): the seam between the API surface and the durable
//! bus. `start_execution`/`resume_execution`/`retry_failed_node` are the
//! producer side — they admit against the subscription quota, touch the
//! Store just enough to create or advance an execution row, then publish an
//! envelope. `route_after_nack`/`apply_route_decision` are the consumer
//! side's redelivery decision once a worker's executor run has failed.
//!
//! Quota admission calls the injected [`SubscriptionGate`] rather than a
//! concrete billing integration (out of scope, spec §1).

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use db::DbPool;
use queue::{CircuitBreaker, Envelope, JobKind};

use crate::collaborators::SubscriptionGate;
use crate::error::EngineError;

/// What `start_execution` actually did (spec §6: a fresh execution gets
/// 200, an idempotency-key collision gets 409 with the prior id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Created(Uuid),
    Replayed(Uuid),
}

impl StartOutcome {
    pub fn execution_id(self) -> Uuid {
        match self {
            Self::Created(id) | Self::Replayed(id) => id,
        }
    }
}

pub struct Dispatcher {
    pool: DbPool,
    breaker: Arc<CircuitBreaker>,
    gate: Arc<dyn SubscriptionGate>,
}

impl Dispatcher {
    pub fn new(pool: DbPool, breaker: Arc<CircuitBreaker>, gate: Arc<dyn SubscriptionGate>) -> Self {
        Self { pool, breaker, gate }
    }

    /// Admit and enqueue a brand new execution (spec §4.1/§4.7). On an
    /// `idempotency_key` collision with a prior call, no new row or
    /// envelope is created (P4) and `Ok(StartOutcome::Replayed(existing_id))`
    /// is returned so the caller can surface spec §6's "409, idempotency
    /// replay returns prior" instead of a silent 200.
    pub async fn start_execution(
        &self,
        workflow_id: Uuid,
        user_id: Uuid,
        subscription_id: Uuid,
        input: Value,
        idempotency_key: Option<&str>,
    ) -> Result<StartOutcome, EngineError> {
        self.gate
            .admit(subscription_id)
            .await
            .map_err(|_| EngineError::QuotaExceeded { subscription_id })?;

        // spec §4.7 step 3: load + ownership check. A workflow that exists
        // but belongs to someone else is rejected the same way as a missing
        // one, so the caller can't probe for other users' workflow ids.
        let workflow = db::repository::workflows::get_workflow(&self.pool, workflow_id).await?;
        if workflow.owner_user_id != user_id {
            return Err(EngineError::Database(db::DbError::NotFound));
        }

        let row = match db::repository::executions::create_execution(
            &self.pool,
            workflow_id,
            user_id,
            input.clone(),
            idempotency_key,
        )
        .await
        {
            Ok(row) => row,
            Err(db::DbError::AlreadyExists(existing)) => return Ok(StartOutcome::Replayed(existing.id)),
            Err(err) => return Err(err.into()),
        };

        // spec §4.7 step 5: only burn a unit of quota once the row exists.
        let _ = crate::collaborators::record_execution_started(&self.pool, subscription_id).await;

        let envelope = Envelope::new(JobKind::Start, row.id, workflow_id, user_id).with_payload(input);
        if let Err(err) = self.publish_primary(&envelope).await {
            // spec §4.7 step 6: EnqueueFailed is surfaced synchronously to
            // the caller, but the execution row must still reach a
            // terminal state rather than sit at `pending` forever.
            let _ = db::repository::executions::update_execution_status(
                &self.pool,
                row.id,
                "failed",
                db::repository::executions::StatusPatch {
                    error: Some(format!("EnqueueFailed: {err}")),
                    finished: true,
                    ..Default::default()
                },
            )
            .await;
            return Err(err);
        }
        Ok(StartOutcome::Created(row.id))
    }

    /// Enqueue a resume for a paused execution. Confirms an unresumed pause
    /// exists so the caller gets a synchronous 404 (spec §6); the atomic
    /// resolve-and-merge of `resumeData` happens when the executor itself
    /// picks up the job, not here, to keep a single writer for that row.
    pub async fn resume_execution(
        &self,
        execution_id: Uuid,
        workflow_id: Uuid,
        user_id: Uuid,
        resume_data: Value,
    ) -> Result<(), EngineError> {
        db::repository::pauses::find_latest_unresumed(&self.pool, execution_id)
            .await?
            .ok_or(EngineError::Database(db::DbError::NotFound))?;

        let envelope = Envelope::new(JobKind::Resume, execution_id, workflow_id, user_id)
            .with_payload(resume_data);
        self.publish_primary(&envelope).await
    }

    /// Re-enqueue a failed execution at a specific node (spec §4.7,
    /// `POST /executions/{id}/retry`). Only legal while the execution is
    /// `failed` or `paused` (409 otherwise); bumps `attempt_count` and
    /// flips the execution back to `running` so a concurrent `GET` doesn't
    /// still read `failed` once the job has been accepted.
    pub async fn retry_failed_node(
        &self,
        execution_id: Uuid,
        workflow_id: Uuid,
        user_id: Uuid,
        node_id: String,
    ) -> Result<(), EngineError> {
        let execution = db::repository::executions::get_execution(&self.pool, execution_id).await?;
        if execution.status != "failed" && execution.status != "paused" {
            return Err(EngineError::Conflict(format!(
                "execution {execution_id} is {}, not failed or paused",
                execution.status
            )));
        }

        db::repository::executions::increment_attempt_count(&self.pool, execution_id).await?;
        db::repository::executions::update_execution_status(
            &self.pool,
            execution_id,
            "running",
            db::repository::executions::StatusPatch::default(),
        )
        .await?;

        let envelope = Envelope::new(JobKind::RetryNode, execution_id, workflow_id, user_id)
            .with_payload(json!({ "nodeId": node_id }));
        self.publish_primary(&envelope).await
    }

    /// Request cancellation of an execution (spec §4.6/§6,
    /// `POST /executions/{id}/cancel`). 409 if already terminal.
    pub async fn cancel_execution(&self, execution_id: Uuid) -> Result<(), EngineError> {
        let execution = db::repository::executions::get_execution(&self.pool, execution_id).await?;
        if execution.status == "completed" || execution.status == "failed" {
            return Err(EngineError::Conflict(format!(
                "execution {execution_id} is already {}",
                execution.status
            )));
        }

        db::repository::executions::request_cancel(&self.pool, execution_id).await?;
        Ok(())
    }

    async fn publish_primary(&self, envelope: &Envelope) -> Result<(), EngineError> {
        let pool = self.pool.clone();
        let envelope = envelope.clone();
        self.breaker
            .call(|| async move { queue::repository::publish_primary(&pool, &envelope).await })
            .await?;
        Ok(())
    }
}

/// What a worker should do with a job whose executor run just failed (spec
/// §4.2). `Retry` carries the already-redelivered envelope (attempt bumped,
/// fresh `job_id`); `DeadLetter` carries the original envelope plus the
/// error that finally exhausted it.
#[derive(Debug, Clone)]
pub enum RouteDecision {
    Retry { envelope: Envelope, delay: Duration },
    DeadLetter { envelope: Envelope, last_error: String },
}

/// Decide whether a failed job gets redelivered or dead-lettered.
/// `envelope.attempt` is the attempt that just failed (0-based); once the
/// *next* attempt would reach `max_attempts` the job is dead-lettered
/// instead.
pub fn route_after_nack(
    envelope: &Envelope,
    last_error: &str,
    max_attempts: u32,
    retry_base: Duration,
    retry_cap: Duration,
) -> RouteDecision {
    if envelope.attempt + 1 >= max_attempts {
        RouteDecision::DeadLetter {
            envelope: envelope.clone(),
            last_error: last_error.to_string(),
        }
    } else {
        RouteDecision::Retry {
            envelope: envelope.redelivery(),
            delay: backoff(envelope.attempt + 1, retry_base, retry_cap),
        }
    }
}

/// Carry out a [`RouteDecision`] against the bus, then ack the original job
/// so it's never picked up twice (the decision's own publish is what makes
/// the work visible again, for `Retry`, or records it terminally, for
/// `DeadLetter`).
pub async fn apply_route_decision(
    pool: &DbPool,
    breaker: &CircuitBreaker,
    job_id: Uuid,
    decision: RouteDecision,
) -> Result<(), EngineError> {
    match decision {
        RouteDecision::Retry { envelope, delay } => {
            let pool2 = pool.clone();
            breaker
                .call(|| async move { queue::repository::publish_retry(&pool2, &envelope, delay).await })
                .await?;
        }
        RouteDecision::DeadLetter { envelope, last_error } => {
            queue::repository::publish_dead_letter(
                pool,
                &envelope,
                "exceeded maximum delivery attempts",
                &last_error,
            )
            .await?;
        }
    }

    queue::repository::ack(pool, job_id).await?;
    Ok(())
}

fn backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let scaled = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    scaled.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope_at_attempt(attempt: u32) -> Envelope {
        let mut envelope = Envelope::new(JobKind::Start, Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        envelope.attempt = attempt;
        envelope
    }

    #[test]
    fn retries_while_attempts_remain() {
        let envelope = envelope_at_attempt(0);
        let decision = route_after_nack(&envelope, "boom", 3, Duration::from_secs(1), Duration::from_secs(60));
        match decision {
            RouteDecision::Retry { envelope: redelivered, delay } => {
                assert_eq!(redelivered.attempt, 1);
                assert_eq!(delay, Duration::from_secs(1));
            }
            RouteDecision::DeadLetter { .. } => panic!("expected retry"),
        }
    }

    #[test]
    fn dead_letters_once_max_attempts_reached() {
        let envelope = envelope_at_attempt(2);
        let decision = route_after_nack(&envelope, "boom", 3, Duration::from_secs(1), Duration::from_secs(60));
        match decision {
            RouteDecision::DeadLetter { last_error, .. } => assert_eq!(last_error, "boom"),
            RouteDecision::Retry { .. } => panic!("expected dead letter"),
        }
    }

    #[test]
    fn retry_backoff_doubles_and_caps() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(10);
        assert_eq!(backoff(1, base, cap), Duration::from_secs(1));
        assert_eq!(backoff(2, base, cap), Duration::from_secs(2));
        assert_eq!(backoff(3, base, cap), Duration::from_secs(4));
        assert_eq!(backoff(10, base, cap), cap);
    }
}
