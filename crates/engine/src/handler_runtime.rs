//! Handler Runtime (spec §4.5): the uniform lifecycle wrapper around every
//! `ExecutableNode::execute` call.
//!
//! For every invocation, in order:
//! 1. Validate the node's config against the block's schema (`BadConfig`,
//!    no handler invocation on failure).
//! 2. Interpolate `{{path.to.value}}` placeholders in the config.
//! 3. Open (upsert) the `NodeExecution` row as `running`.
//! 4. Invoke the handler, racing it against the per-node timeout and the
//!    execution's cancellation token.
//! 5. Close the row (`completed`/`failed`) and emit an Event Hub update —
//!    guaranteed even if the handler future panics, via a drop guard.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use db::repository::node_executions::{upsert_node_execution, NodeExecutionPatch};
use db::DbPool;
use nodes::traits::{ExecutionContext, LogLevel, NodeLogSink, NodeOutput};
use nodes::{BlockRegistry, NodeError};

use crate::event_hub::{EventHub, NodeUpdate};
use crate::interpolate::{build_scope, interpolate_value};
use crate::models::NodeDefinition;

/// Spec §5: "the runtime waits up to a grace window (default 5 s) for
/// handler cleanup, then force-closes the NodeExecution as
/// `failed(reason=cancelled)`".
const CANCEL_GRACE_WINDOW: Duration = Duration::from_secs(5);

/// Everything about the surrounding execution a single node invocation
/// needs but that doesn't vary invocation to invocation.
pub struct InvocationContext<'a> {
    pub pool: &'a DbPool,
    pub event_hub: &'a EventHub,
    pub registry: &'a BlockRegistry,
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    pub user_id: Uuid,
    pub cancel: CancellationToken,
}

pub struct HandlerRuntime;

impl HandlerRuntime {
    /// Run one node attempt end to end.
    ///
    /// `workflow_input` and `node_outputs` build the interpolation scope;
    /// `timeout` is the already-resolved per-node timeout (engine default
    /// or the node's own override).
    pub async fn invoke(
        ctx: &InvocationContext<'_>,
        node: &NodeDefinition,
        attempt: i32,
        workflow_input: &Value,
        node_outputs: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<NodeOutput, NodeError> {
        let descriptor = ctx.registry.get(&node.node_type).ok_or_else(|| {
            NodeError::BadConfig(format!("unknown block type '{}'", node.node_type))
        })?;

        let scope = build_scope(workflow_input, node_outputs);
        let interpolated_config = interpolate_value(&node.config, &scope);

        open_row(ctx.pool, ctx.execution_id, &node.id, attempt, interpolated_config.clone()).await;
        emit(ctx.event_hub, ctx.execution_id, &node.id, "running", Value::Null);

        if let Err(validation_err) = descriptor.config_schema.validate(&interpolated_config) {
            close_row_failed(ctx.pool, ctx.execution_id, &node.id, attempt, &validation_err).await;
            emit_error(ctx.event_hub, ctx.execution_id, &node.id, &validation_err);
            return Err(validation_err);
        }

        let logger: Arc<dyn NodeLogSink> = Arc::new(EventHubLogSink {
            pool: ctx.pool.clone(),
            event_hub_execution_id: ctx.execution_id,
            node_id: node.id.clone(),
        });

        let exec_ctx = ExecutionContext {
            workflow_id: ctx.workflow_id,
            execution_id: ctx.execution_id,
            node_id: node.id.clone(),
            user_id: ctx.user_id,
            inputs: interpolated_config.clone(),
            variables: scope,
            logger,
            cancel: ctx.cancel.clone(),
        };

        let mut guard = RowGuard {
            pool: ctx.pool.clone(),
            execution_id: ctx.execution_id,
            node_id: node.id.clone(),
            attempt,
            armed: true,
        };

        let handler_fut = descriptor.handler.execute(&interpolated_config, &exec_ctx);
        tokio::pin!(handler_fut);

        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, &mut handler_fut) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(NodeError::Cancelled { reason: "timeout".into() }),
                }
            }
            _ = ctx.cancel.cancelled() => {
                // spec §5: give the handler up to a grace window to unwind
                // on its own (observing `ctx.cancel` inside its own I/O)
                // before the row is force-closed as cancelled.
                match tokio::time::timeout(CANCEL_GRACE_WINDOW, &mut handler_fut).await {
                    Ok(inner) => inner,
                    Err(_) => Err(NodeError::Cancelled { reason: "cancelled".into() }),
                }
            }
        };

        guard.disarm();

        match &outcome {
            Ok(output) => {
                close_row_completed(ctx.pool, ctx.execution_id, &node.id, attempt, output).await;
                emit(
                    ctx.event_hub,
                    ctx.execution_id,
                    &node.id,
                    "completed",
                    output.value.clone(),
                );
            }
            Err(NodeError::Paused { .. }) => {
                // Row intentionally left `running` — the executor records a
                // Pause row and the node resumes from there, per spec §4.6
                // scenario 4.
            }
            Err(err) => {
                close_row_failed(ctx.pool, ctx.execution_id, &node.id, attempt, err).await;
                emit_error(ctx.event_hub, ctx.execution_id, &node.id, err);
            }
        }

        outcome
    }
}

async fn open_row(pool: &DbPool, execution_id: Uuid, node_id: &str, attempt: i32, input: Value) {
    let _ = upsert_node_execution(
        pool,
        execution_id,
        node_id,
        attempt,
        NodeExecutionPatch {
            status: "running".into(),
            input: Some(input),
            started_at: Some(Utc::now()),
            ..Default::default()
        },
    )
    .await;
}

async fn close_row_completed(pool: &DbPool, execution_id: Uuid, node_id: &str, attempt: i32, output: &NodeOutput) {
    let _ = upsert_node_execution(
        pool,
        execution_id,
        node_id,
        attempt,
        NodeExecutionPatch {
            status: "completed".into(),
            output: Some(output.value.clone()),
            finished_at: Some(Utc::now()),
            ..Default::default()
        },
    )
    .await;
}

async fn close_row_failed(pool: &DbPool, execution_id: Uuid, node_id: &str, attempt: i32, err: &NodeError) {
    let _ = upsert_node_execution(
        pool,
        execution_id,
        node_id,
        attempt,
        NodeExecutionPatch {
            status: "failed".into(),
            error: Some(err.to_string()),
            finished_at: Some(Utc::now()),
            ..Default::default()
        },
    )
    .await;
}

fn emit(hub: &EventHub, execution_id: Uuid, node_id: &str, status: &str, data: Value) {
    hub.publish(NodeUpdate {
        execution_id,
        node_id: Some(node_id.to_string()),
        status: status.to_string(),
        timestamp: Utc::now(),
        data,
    });
}

fn emit_error(hub: &EventHub, execution_id: Uuid, node_id: &str, err: &NodeError) {
    emit(hub, execution_id, node_id, "failed", Value::String(err.to_string()));
}

/// RAII safety net: if the handler future panics, unwinding drops this
/// guard while still armed, and we record the row as failed from a
/// detached task rather than leaving it stuck at `running` forever.
struct RowGuard {
    pool: DbPool,
    execution_id: Uuid,
    node_id: String,
    attempt: i32,
    armed: bool,
}

impl RowGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let pool = self.pool.clone();
        let execution_id = self.execution_id;
        let node_id = self.node_id.clone();
        let attempt = self.attempt;
        tokio::spawn(async move {
            let _ = upsert_node_execution(
                &pool,
                execution_id,
                &node_id,
                attempt,
                NodeExecutionPatch {
                    status: "failed".into(),
                    error: Some("handler exited without closing this node execution".into()),
                    finished_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await;
        });
    }
}

/// Routes node log lines to the Store and the Event Hub. Handlers never
/// talk to either directly.
struct EventHubLogSink {
    pool: DbPool,
    event_hub_execution_id: Uuid,
    node_id: String,
}

impl NodeLogSink for EventHubLogSink {
    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        let pool = self.pool.clone();
        let execution_id = self.event_hub_execution_id;
        let node_id = self.node_id.clone();
        let level_str = match level {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        let message = message.to_string();
        tokio::spawn(async move {
            let _ = db::repository::logs::append_log(
                &pool,
                execution_id,
                Some(&node_id),
                level_str,
                &message,
                metadata,
            )
            .await;
        });
    }
}
