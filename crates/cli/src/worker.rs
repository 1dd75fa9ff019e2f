//! `worker` subcommand (spec §4.2/§4.7/§6): polls the primary+retry
//! channels, drives the executor for whatever job it claims, and routes a
//! failed run through the dispatcher's nack logic (retry-with-backoff or
//! dead-letter). Responds to SIGTERM by refusing new claims and draining
//! in-flight executions up to a grace window before exiting 0.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use db::DbPool;
use engine::{EngineConfig, EventHub, ExecutionOutcome, Workflow, WorkflowExecutor};
use nodes::BlockRegistry;
use queue::repository::ClaimedJob;
use queue::{CircuitBreaker, CircuitBreakerConfig, Envelope, JobKind};

/// How often an idle worker polls the bus when nothing was claimed.
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Claim lease duration; must comfortably exceed the workflow timeout so a
/// healthy worker never loses its own lease mid-execution.
const LEASE_DURATION: Duration = Duration::from_secs(60 * 70);
/// Shutdown grace window (spec §6 exit-code contract).
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
/// Queue-level redelivery ceiling. Distinct from the per-node retry budget
/// (`MAX_NODE_RETRIES`, spec §4.6) — this bounds how many times a whole
/// executor run may be redelivered after an infra-level failure (worker
/// crash, lease expiry) before the job is dead-lettered. The spec's env
/// list (§6) has no dedicated knob for this, so it's a fixed local default.
const QUEUE_MAX_ATTEMPTS: u32 = 5;

pub async fn run(pool: DbPool, registry: Arc<BlockRegistry>) -> anyhow::Result<()> {
    let config = EngineConfig::from_env();
    let breaker = Arc::new(CircuitBreaker::new("queue", CircuitBreakerConfig::from_env()));
    let event_hub = Arc::new(EventHub::new());
    let executor = Arc::new(WorkflowExecutor::new(pool.clone(), registry, event_hub, config));

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    // Bounds in-flight executions this worker process runs concurrently;
    // each execution internally fans out up to `max_concurrent_nodes` of
    // its own node tasks on top of this.
    let permits = Arc::new(Semaphore::new(config.max_concurrent_nodes.max(1)));
    let mut in_flight: JoinSet<()> = JoinSet::new();

    info!("worker started, polling every {:?}", POLL_INTERVAL);

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let claimed = tokio::select! {
            result = queue::repository::claim_next(&pool, LEASE_DURATION) => result,
            _ = shutdown.cancelled() => break,
        };

        let job = match claimed {
            Ok(Some(job)) => job,
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => continue,
                    _ = shutdown.cancelled() => break,
                }
            }
            Err(err) => {
                error!("failed to claim next job: {err}");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        let permits = permits.clone();
        let pool = pool.clone();
        let executor = executor.clone();
        let breaker = breaker.clone();
        let worker_cancel = shutdown.clone();

        in_flight.spawn(async move {
            let _permit = permits.acquire_owned().await.expect("semaphore never closed");
            process_job(&pool, &executor, &breaker, job, worker_cancel).await;
        });
    }

    info!("shutdown requested, draining {} in-flight execution(s)", in_flight.len());
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while in_flight.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!("shutdown grace window elapsed with executions still in flight");
    }

    Ok(())
}

async fn process_job(
    pool: &DbPool,
    executor: &WorkflowExecutor,
    breaker: &CircuitBreaker,
    job: ClaimedJob,
    cancel: CancellationToken,
) {
    let ClaimedJob { job_id, envelope } = job;

    let workflow = match load_workflow(pool, envelope.workflow_id).await {
        Ok(wf) => wf,
        Err(err) => {
            error!(execution_id = %envelope.execution_id, "poison envelope, workflow unloadable: {err}");
            let _ = queue::repository::publish_dead_letter(
                pool,
                &envelope,
                "workflow unloadable",
                &err.to_string(),
            )
            .await;
            let _ = queue::repository::ack(pool, job_id).await;
            return;
        }
    };

    let node_cancel = CancellationToken::new();
    let outcome = run_envelope(pool, executor, &workflow, &envelope, node_cancel).await;

    match outcome {
        Ok(ExecutionOutcome::Completed(_)) | Ok(ExecutionOutcome::Paused { .. }) => {
            let _ = queue::repository::ack(pool, job_id).await;
        }
        Err(engine::EngineError::Cancelled) => {
            // Already a terminal `failed` row; nothing left to redeliver.
            let _ = queue::repository::ack(pool, job_id).await;
        }
        Err(err) => {
            warn!(execution_id = %envelope.execution_id, "executor run failed: {err}");
            route_failure(pool, breaker, job_id, &envelope, &err).await;
        }
    }
}

async fn run_envelope(
    pool: &DbPool,
    executor: &WorkflowExecutor,
    workflow: &Workflow,
    envelope: &Envelope,
    cancel: CancellationToken,
) -> Result<ExecutionOutcome, engine::EngineError> {
    match envelope.kind {
        JobKind::Start => {
            executor
                .run(workflow, envelope.execution_id, envelope.user_id, envelope.payload.clone(), cancel)
                .await
        }
        JobKind::Resume => {
            let execution = db::repository::executions::get_execution(pool, envelope.execution_id).await?;
            executor
                .resume(
                    workflow,
                    envelope.execution_id,
                    envelope.user_id,
                    execution.input,
                    envelope.payload.clone(),
                    cancel,
                )
                .await
        }
        JobKind::RetryNode => {
            let execution = db::repository::executions::get_execution(pool, envelope.execution_id).await?;
            let node_id = envelope
                .payload
                .get("nodeId")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| engine::EngineError::BadWorkflow("retry-node envelope missing nodeId".into()))?;
            executor
                .retry_node(workflow, envelope.execution_id, envelope.user_id, execution.input, node_id, cancel)
                .await
        }
    }
}

async fn route_failure(
    pool: &DbPool,
    breaker: &CircuitBreaker,
    job_id: Uuid,
    envelope: &Envelope,
    err: &engine::EngineError,
) {
    let decision = engine::route_after_nack(
        envelope,
        &err.to_string(),
        QUEUE_MAX_ATTEMPTS,
        Duration::from_secs(1),
        Duration::from_secs(60),
    );

    if let Err(route_err) = engine::apply_route_decision(pool, breaker, job_id, decision).await {
        error!(job_id = %job_id, "failed to route nacked job: {route_err}");
    }
}

async fn load_workflow(pool: &DbPool, workflow_id: Uuid) -> Result<Workflow, anyhow::Error> {
    let row = db::repository::workflows::get_workflow(pool, workflow_id).await?;
    let workflow: Workflow = serde_json::from_value(row.definition)?;
    Ok(workflow)
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Ok(mut term) = signal_stream() {
            term.recv().await;
            info!("received SIGTERM, starting graceful shutdown");
            shutdown.cancel();
        }
    });
}

#[cfg(unix)]
fn signal_stream() -> std::io::Result<tokio::signal::unix::Signal> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
}

#[cfg(not(unix))]
fn signal_stream() -> std::io::Result<NeverSignal> {
    Ok(NeverSignal)
}

#[cfg(not(unix))]
struct NeverSignal;

#[cfg(not(unix))]
impl NeverSignal {
    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}
