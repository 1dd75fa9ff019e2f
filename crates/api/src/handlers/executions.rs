//! Execution control plane (spec §6's HTTP table). Every handler here loads
//! the execution row first and checks `user_id` against the caller's
//! session before doing anything else, so a caller can never learn whether
//! someone else's execution id exists (404 either way, per the same logic
//! the dispatcher applies to workflow ownership).

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    Extension, Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use db::models::NodeExecutionRow;
use engine::collaborators::Session;

use super::AppState;
use crate::error::ApiError;

/// How many trailing log lines to embed in `GET /executions/{id}` (spec §6:
/// "execution with nested nodeExecutions and tail of logs").
const LOG_TAIL_LIMIT: i64 = 200;

/// Gap between SSE heartbeat comments (spec §6).
const SSE_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExecutionDto {
    pub workflow_id: Uuid,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

pub async fn start_execution(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<StartExecutionDto>,
) -> Result<(axum::http::StatusCode, Json<Value>), ApiError> {
    let outcome = state
        .dispatcher
        .start_execution(
            body.workflow_id,
            session.user_id,
            session.subscription_id,
            body.input.unwrap_or(Value::Null),
            body.idempotency_key.as_deref(),
        )
        .await?;

    // spec §6: a fresh execution is 200; an idempotency-key replay is 409
    // carrying the prior execution id rather than a silent success.
    let (status, execution_id) = match outcome {
        engine::StartOutcome::Created(id) => (axum::http::StatusCode::OK, id),
        engine::StartOutcome::Replayed(id) => (axum::http::StatusCode::CONFLICT, id),
    };

    Ok((status, Json(json!({ "executionId": execution_id }))))
}

pub async fn get_execution(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let execution = load_owned_execution(&state, &session, id).await?;
    let node_executions = db::repository::node_executions::list_for_execution(&state.pool, id).await?;
    let logs = db::repository::logs::tail_logs(&state.pool, id, LOG_TAIL_LIMIT).await?;

    Ok(Json(json!({
        "id": execution.id,
        "workflowId": execution.workflow_id,
        "status": execution.status,
        "input": execution.input,
        "output": execution.output,
        "error": execution.error,
        "attemptCount": execution.attempt_count,
        "startedAt": execution.started_at,
        "finishedAt": execution.finished_at,
        "nodeExecutions": node_executions,
        "logs": logs,
    })))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResumeExecutionDto {
    #[serde(default)]
    pub resume_data: Option<Value>,
}

pub async fn resume_execution(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
    Json(body): Json<ResumeExecutionDto>,
) -> Result<Json<Value>, ApiError> {
    let execution = load_owned_execution(&state, &session, id).await?;

    state
        .dispatcher
        .resume_execution(id, execution.workflow_id, session.user_id, body.resume_data.unwrap_or(Value::Null))
        .await?;

    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryExecutionDto {
    pub node_id: String,
}

pub async fn retry_execution(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
    Json(body): Json<RetryExecutionDto>,
) -> Result<Json<Value>, ApiError> {
    let execution = load_owned_execution(&state, &session, id).await?;

    state
        .dispatcher
        .retry_failed_node(id, execution.workflow_id, session.user_id, body.node_id)
        .await?;

    Ok(Json(json!({ "ok": true })))
}

pub async fn cancel_execution(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    load_owned_execution(&state, &session, id).await?;
    state.dispatcher.cancel_execution(id).await?;
    Ok(Json(json!({ "ok": true })))
}

/// Merged node list: every node the workflow definition declares, paired
/// with its latest-attempt execution row or a synthetic `pending` entry if
/// the node hasn't started yet (spec §6).
pub async fn list_node_executions(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let execution = load_owned_execution(&state, &session, id).await?;
    let workflow_row = db::repository::workflows::get_workflow(&state.pool, execution.workflow_id).await?;
    let workflow: engine::Workflow = serde_json::from_value(workflow_row.definition)
        .map_err(|e| ApiError::Internal(format!("stored workflow definition is invalid: {e}")))?;

    let rows = db::repository::node_executions::list_for_execution(&state.pool, id).await?;
    let mut latest_by_node: std::collections::HashMap<String, NodeExecutionRow> = std::collections::HashMap::new();
    for row in rows {
        latest_by_node
            .entry(row.node_id.clone())
            .and_modify(|existing| {
                if row.attempt > existing.attempt {
                    *existing = row.clone();
                }
            })
            .or_insert(row);
    }

    let merged: Vec<Value> = workflow
        .nodes
        .iter()
        .map(|node| match latest_by_node.get(&node.id) {
            Some(row) => json!(row),
            None => json!({ "nodeId": node.id, "status": "pending" }),
        })
        .collect();

    Ok(Json(json!({ "nodeExecutions": merged })))
}

/// SSE relay of the Event Hub's live `NodeUpdate`s for one execution (spec
/// §4.8/§6). Grounded on the pack's `stream::unfold` + `flatten` SSE idiom
/// (everruns' events route) rather than hand-rolling an `async_stream`.
pub async fn stream_events(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    load_owned_execution(&state, &session, id).await?;

    let rx = state.event_hub.subscribe(id);
    let initial = stream::once(async { Ok(SseEvent::default().comment("connected")) });

    let tail = stream::unfold(rx, |mut rx| async move {
        loop {
            tokio::select! {
                biased;
                update = rx.recv() => {
                    match update {
                        Ok(update) => {
                            let data = serde_json::to_string(&update).unwrap_or_else(|_| "{}".into());
                            return Some((Ok(SseEvent::default().data(data)), rx));
                        }
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => return None,
                    }
                }
                _ = tokio::time::sleep(SSE_HEARTBEAT_INTERVAL) => {
                    return Some((Ok(SseEvent::default().comment("heartbeat")), rx));
                }
            }
        }
    });

    Ok(Sse::new(initial.chain(tail)).keep_alive(KeepAlive::default()))
}

async fn load_owned_execution(
    state: &AppState,
    session: &Session,
    execution_id: Uuid,
) -> Result<db::models::WorkflowExecutionRow, ApiError> {
    let execution = db::repository::executions::get_execution(&state.pool, execution_id).await?;
    if execution.user_id != session.user_id {
        return Err(ApiError::NotFound);
    }
    Ok(execution)
}
