//! Workflow execution engine — the parallel DAG scheduler (spec §4.6).
//!
//! `WorkflowExecutor::run` drives a fresh execution from its trigger input;
//! `WorkflowExecutor::resume` continues a `paused` execution once external
//! resume data has arrived. Both funnel into [`WorkflowExecutor::drive`],
//! which owns the actual scheduling loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use db::DbPool;
use nodes::{BlockRegistry, NodeError, NodeOutput};

use crate::config::EngineConfig;
use crate::dag::validate_dag;
use crate::error::EngineError;
use crate::event_hub::EventHub;
use crate::handler_runtime::{HandlerRuntime, InvocationContext};
use crate::models::{Edge, NodeDefinition, Workflow};

/// What a `run`/`resume` call produced.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Completed(Value),
    Paused { request_id: String },
}

#[derive(Debug, Clone, PartialEq)]
enum NodeState {
    Pending,
    Running,
    Completed(Option<String>),
    Skipped,
    Failed,
}

pub struct WorkflowExecutor {
    pool: DbPool,
    registry: Arc<BlockRegistry>,
    event_hub: Arc<EventHub>,
    config: EngineConfig,
}

impl WorkflowExecutor {
    pub fn new(
        pool: DbPool,
        registry: Arc<BlockRegistry>,
        event_hub: Arc<EventHub>,
        config: EngineConfig,
    ) -> Self {
        Self {
            pool,
            registry,
            event_hub,
            config,
        }
    }

    /// Start a brand new execution.
    #[instrument(skip(self, workflow, input), fields(workflow_id = %workflow.id, execution_id = %execution_id))]
    pub async fn run(
        &self,
        workflow: &Workflow,
        execution_id: Uuid,
        user_id: Uuid,
        input: Value,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, EngineError> {
        validate_dag(workflow)?;

        db::repository::executions::update_execution_status(
            &self.pool,
            execution_id,
            "running",
            db::repository::executions::StatusPatch::default(),
        )
        .await?;

        let status = workflow
            .nodes
            .iter()
            .map(|n| (n.id.clone(), NodeState::Pending))
            .collect();

        self.drive(workflow, execution_id, user_id, input, status, Map::new(), cancel)
            .await
    }

    /// Continue a `paused` execution. `resume_data` becomes the paused
    /// node's recorded output (spec §4.6 scenario 4); the executor does not
    /// re-invoke the node that paused.
    #[instrument(skip(self, workflow, resume_data), fields(workflow_id = %workflow.id, execution_id = %execution_id))]
    pub async fn resume(
        &self,
        workflow: &Workflow,
        execution_id: Uuid,
        user_id: Uuid,
        workflow_input: Value,
        resume_data: Value,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, EngineError> {
        validate_dag(workflow)?;

        let pause = db::repository::pauses::find_latest_unresumed(&self.pool, execution_id)
            .await?
            .ok_or_else(|| EngineError::BadWorkflow("no pending pause for this execution".into()))?;

        db::repository::pauses::resolve_pause(&self.pool, pause.id, resume_data.clone()).await?;

        let rows = db::repository::node_executions::list_for_execution(&self.pool, execution_id).await?;

        let mut status: HashMap<String, NodeState> = workflow
            .nodes
            .iter()
            .map(|n| (n.id.clone(), NodeState::Pending))
            .collect();
        let mut node_outputs = Map::new();

        for row in rows {
            match row.status.as_str() {
                "completed" => {
                    status.insert(row.node_id.clone(), NodeState::Completed(None));
                    node_outputs.insert(row.node_id.clone(), row.output.unwrap_or(Value::Null));
                }
                "skipped" => {
                    status.insert(row.node_id.clone(), NodeState::Skipped);
                }
                _ => {}
            }
        }

        status.insert(pause.node_id.clone(), NodeState::Completed(None));
        node_outputs.insert(pause.node_id.clone(), resume_data.clone());

        db::repository::node_executions::upsert_node_execution(
            &self.pool,
            execution_id,
            &pause.node_id,
            1,
            db::repository::node_executions::NodeExecutionPatch {
                status: "completed".into(),
                output: Some(resume_data),
                finished_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;

        db::repository::executions::update_execution_status(
            &self.pool,
            execution_id,
            "running",
            db::repository::executions::StatusPatch::default(),
        )
        .await?;

        self.drive(workflow, execution_id, user_id, workflow_input, status, node_outputs, cancel)
            .await
    }

    /// Re-enter a `failed`/`paused` execution at a specific node (spec §4.7,
    /// `RetryFailedNode`). Completed/skipped nodes are replayed from their
    /// stored rows; `node_id` (and anything never reached) starts `Pending`
    /// again so the next `drive` loop picks it up as a fresh ready-node
    /// decision, per spec: "upstream remain completed".
    #[instrument(skip(self, workflow, workflow_input), fields(workflow_id = %workflow.id, execution_id = %execution_id))]
    pub async fn retry_node(
        &self,
        workflow: &Workflow,
        execution_id: Uuid,
        user_id: Uuid,
        workflow_input: Value,
        node_id: &str,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, EngineError> {
        validate_dag(workflow)?;

        if !workflow.nodes.iter().any(|n| n.id == node_id) {
            return Err(EngineError::UnknownNodeReference {
                node_id: node_id.to_string(),
                side: "retry target",
            });
        }

        let rows = db::repository::node_executions::list_for_execution(&self.pool, execution_id).await?;

        let mut status: HashMap<String, NodeState> = workflow
            .nodes
            .iter()
            .map(|n| (n.id.clone(), NodeState::Pending))
            .collect();
        let mut node_outputs = Map::new();

        for row in rows {
            match row.status.as_str() {
                "completed" if row.node_id != node_id => {
                    status.insert(row.node_id.clone(), NodeState::Completed(None));
                    node_outputs.insert(row.node_id.clone(), row.output.unwrap_or(Value::Null));
                }
                "skipped" if row.node_id != node_id => {
                    status.insert(row.node_id.clone(), NodeState::Skipped);
                }
                _ => {}
            }
        }

        db::repository::executions::update_execution_status(
            &self.pool,
            execution_id,
            "running",
            db::repository::executions::StatusPatch::default(),
        )
        .await?;

        self.drive(workflow, execution_id, user_id, workflow_input, status, node_outputs, cancel)
            .await
    }

    async fn drive(
        &self,
        workflow: &Workflow,
        execution_id: Uuid,
        user_id: Uuid,
        workflow_input: Value,
        mut status: HashMap<String, NodeState>,
        mut node_outputs: Map<String, Value>,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, EngineError> {
        let node_ids: Vec<String> = workflow.nodes.iter().map(|n| n.id.clone()).collect();
        let node_map: HashMap<&str, &NodeDefinition> =
            workflow.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut inbound: HashMap<String, Vec<Edge>> = HashMap::new();
        for edge in &workflow.edges {
            inbound.entry(edge.to.clone()).or_default().push(edge.clone());
        }

        let deadline = Instant::now() + self.config.workflow_timeout;

        let mut joinset: JoinSet<(String, Result<NodeOutput, NodeError>)> = JoinSet::new();
        let mut running = 0usize;

        loop {
            if let Ok(row) = db::repository::executions::get_execution(&self.pool, execution_id).await {
                if row.cancel_requested {
                    // spec §4.6: CancelExecution only ever sets a flag; the
                    // executor is the sole writer of `status`, checked at
                    // every readiness iteration and at every node boundary.
                    cancel.cancel();
                    // Best-effort: a concurrent node failure may have already
                    // landed a terminal status first, in which case this is a
                    // no-op (`NotFound`) rather than an error worth surfacing.
                    let _ = db::repository::executions::update_execution_status(
                        &self.pool,
                        execution_id,
                        "failed",
                        db::repository::executions::StatusPatch {
                            error: Some("execution cancelled".into()),
                            finished: true,
                            ..Default::default()
                        },
                    )
                    .await;
                    self.event_hub.retire(execution_id);
                    return Err(EngineError::Cancelled);
                }
            }

            let ready = recompute_ready(&node_ids, &inbound, &mut status);
            for node_id in ready {
                if let Some(skipped_state) = status.get(&node_id) {
                    if *skipped_state == NodeState::Skipped {
                        self.mark_skipped(execution_id, &node_id).await;
                        continue;
                    }
                }
                if running >= self.config.max_concurrent_nodes {
                    status.insert(node_id, NodeState::Pending);
                    continue;
                }
                let node = (*node_map.get(node_id.as_str()).expect("node in workflow")).clone();
                let pool = self.pool.clone();
                let registry = self.registry.clone();
                let event_hub = self.event_hub.clone();
                let cancel = cancel.clone();
                let workflow_input = workflow_input.clone();
                let node_outputs_snapshot = node_outputs.clone();
                let workflow_id = workflow.id;
                let max_retries = node.retries.unwrap_or(self.config.max_node_retries);
                let timeout = node
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.config.node_timeout);
                let retry_base = self.config.retry_base_delay;
                let retry_max = self.config.retry_max_delay;

                running += 1;
                joinset.spawn(async move {
                    let inv_ctx = InvocationContext {
                        pool: &pool,
                        event_hub: &event_hub,
                        registry: &registry,
                        workflow_id,
                        execution_id,
                        user_id,
                        cancel: cancel.clone(),
                    };

                    let mut attempt = 1u32;
                    let outcome = loop {
                        let result = HandlerRuntime::invoke(
                            &inv_ctx,
                            &node,
                            attempt as i32,
                            &workflow_input,
                            &node_outputs_snapshot,
                            timeout,
                        )
                        .await;

                        match result {
                            Err(NodeError::Retryable(msg)) if attempt <= max_retries => {
                                let delay = backoff(attempt, retry_base, retry_max);
                                warn!(node_id = %node.id, attempt, ?delay, "retrying after retryable error: {msg}");
                                tokio::select! {
                                    _ = tokio::time::sleep(delay) => {}
                                    _ = cancel.cancelled() => break Err(NodeError::Fatal("cancelled".into())),
                                }
                                attempt += 1;
                                continue;
                            }
                            other => break other,
                        }
                    };

                    (node.id.clone(), outcome)
                });
            }

            if running == 0 {
                if status.values().all(|s| {
                    matches!(s, NodeState::Completed(_) | NodeState::Skipped | NodeState::Failed)
                }) {
                    break;
                }
                return Err(EngineError::BadWorkflow(
                    "scheduler stalled with pending nodes but nothing runnable".into(),
                ));
            }

            tokio::select! {
                Some(joined) = joinset.join_next() => {
                    running -= 1;
                    let (node_id, outcome) = match joined {
                        Ok(pair) => pair,
                        Err(join_err) => {
                            error!("node task panicked: {join_err}");
                            continue;
                        }
                    };

                    match outcome {
                        Ok(output) => {
                            info!(node_id = %node_id, "node completed");
                            status.insert(node_id.clone(), NodeState::Completed(output.handle.clone()));
                            node_outputs.insert(node_id, output.value);
                        }
                        Err(NodeError::Paused { request_id }) => {
                            db::repository::pauses::create_pause(&self.pool, execution_id, &node_id).await?;
                            db::repository::executions::update_execution_status(
                                &self.pool,
                                execution_id,
                                "paused",
                                db::repository::executions::StatusPatch::default(),
                            )
                            .await?;
                            return Ok(ExecutionOutcome::Paused { request_id });
                        }
                        Err(err) => {
                            error!(node_id = %node_id, "node failed: {err}");
                            status.insert(node_id.clone(), NodeState::Failed);
                            db::repository::executions::update_execution_status(
                                &self.pool,
                                execution_id,
                                "failed",
                                db::repository::executions::StatusPatch {
                                    error: Some(err.to_string()),
                                    finished: true,
                                    ..Default::default()
                                },
                            )
                            .await?;
                            return Err(EngineError::NodeFatal {
                                node_id,
                                message: err.to_string(),
                            });
                        }
                    }
                }
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                    cancel.cancel();
                    db::repository::executions::update_execution_status(
                        &self.pool,
                        execution_id,
                        "failed",
                        db::repository::executions::StatusPatch {
                            error: Some("workflow execution timed out".into()),
                            finished: true,
                            ..Default::default()
                        },
                    )
                    .await?;
                    return Err(EngineError::WorkflowTimeout);
                }
            }
        }

        let output = Value::Object(node_outputs.clone());

        db::repository::executions::update_execution_status(
            &self.pool,
            execution_id,
            "completed",
            db::repository::executions::StatusPatch {
                output: Some(Value::Object(node_outputs)),
                finished: true,
                ..Default::default()
            },
        )
        .await?;

        self.event_hub.retire(execution_id);

        Ok(ExecutionOutcome::Completed(output))
    }

    async fn mark_skipped(&self, execution_id: Uuid, node_id: &str) {
        let _ = db::repository::node_executions::upsert_node_execution(
            &self.pool,
            execution_id,
            node_id,
            1,
            db::repository::node_executions::NodeExecutionPatch {
                status: "skipped".into(),
                finished_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await;
    }
}

/// Mark every node whose inbound edges are all resolved as either `Running`
/// (at least one inbound edge fired into it, or it has none) or `Skipped`
/// (every inbound edge resolved but none fired). Nodes still blocked on an
/// in-flight upstream are left `Pending`. Returns the ids just promoted out
/// of `Pending` (both the ones to actually run and the ones just marked
/// skipped — callers distinguish by re-checking `status`).
fn recompute_ready(
    node_ids: &[String],
    inbound: &HashMap<String, Vec<Edge>>,
    status: &mut HashMap<String, NodeState>,
) -> Vec<String> {
    let mut promoted = Vec::new();
    loop {
        let mut changed = false;
        for node_id in node_ids {
            if !matches!(status.get(node_id), Some(NodeState::Pending)) {
                continue;
            }

            let edges = inbound.get(node_id);
            let edges = match edges {
                Some(e) if !e.is_empty() => e,
                _ => {
                    status.insert(node_id.clone(), NodeState::Running);
                    promoted.push(node_id.clone());
                    changed = true;
                    continue;
                }
            };

            let mut blocked = false;
            let mut any_applicable = false;
            for edge in edges {
                match status.get(&edge.from) {
                    Some(NodeState::Completed(handle)) => {
                        if edge.source_handle.is_none() || edge.source_handle.as_deref() == handle.as_deref() {
                            any_applicable = true;
                        }
                    }
                    Some(NodeState::Skipped) | Some(NodeState::Failed) => {}
                    _ => blocked = true,
                }
            }

            if blocked {
                continue;
            }

            if any_applicable {
                status.insert(node_id.clone(), NodeState::Running);
            } else {
                status.insert(node_id.clone(), NodeState::Skipped);
            }
            promoted.push(node_id.clone());
            changed = true;
        }
        if !changed {
            break;
        }
    }
    promoted
}

fn backoff(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let scaled = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    scaled.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn node_with_no_inbound_edges_is_immediately_ready() {
        let node_ids = ids(&["a"]);
        let inbound = HashMap::new();
        let mut status = HashMap::from([("a".to_string(), NodeState::Pending)]);

        let promoted = recompute_ready(&node_ids, &inbound, &mut status);

        assert_eq!(promoted, vec!["a".to_string()]);
        assert_eq!(status["a"], NodeState::Running);
    }

    #[test]
    fn node_blocked_on_unresolved_upstream_stays_pending() {
        let node_ids = ids(&["a", "b"]);
        let mut inbound = HashMap::new();
        inbound.insert(
            "b".to_string(),
            vec![Edge { from: "a".into(), to: "b".into(), source_handle: None }],
        );
        let mut status = HashMap::from([
            ("a".to_string(), NodeState::Running),
            ("b".to_string(), NodeState::Pending),
        ]);

        let promoted = recompute_ready(&node_ids, &inbound, &mut status);

        assert!(promoted.is_empty());
        assert_eq!(status["b"], NodeState::Pending);
    }

    #[test]
    fn node_downstream_of_unmatched_handle_is_skipped() {
        let node_ids = ids(&["cond", "on_true"]);
        let mut inbound = HashMap::new();
        inbound.insert(
            "on_true".to_string(),
            vec![Edge {
                from: "cond".into(),
                to: "on_true".into(),
                source_handle: Some("true".into()),
            }],
        );
        let mut status = HashMap::from([
            ("cond".to_string(), NodeState::Completed(Some("false".into()))),
            ("on_true".to_string(), NodeState::Pending),
        ]);

        recompute_ready(&node_ids, &inbound, &mut status);

        assert_eq!(status["on_true"], NodeState::Skipped);
    }

    #[test]
    fn node_downstream_of_matched_handle_runs() {
        let node_ids = ids(&["cond", "on_true"]);
        let mut inbound = HashMap::new();
        inbound.insert(
            "on_true".to_string(),
            vec![Edge {
                from: "cond".into(),
                to: "on_true".into(),
                source_handle: Some("true".into()),
            }],
        );
        let mut status = HashMap::from([
            ("cond".to_string(), NodeState::Completed(Some("true".into()))),
            ("on_true".to_string(), NodeState::Pending),
        ]);

        recompute_ready(&node_ids, &inbound, &mut status);

        assert_eq!(status["on_true"], NodeState::Running);
    }

    #[test]
    fn join_node_runs_once_any_inbound_edge_is_applicable() {
        let node_ids = ids(&["a", "b", "join"]);
        let mut inbound = HashMap::new();
        inbound.insert(
            "join".to_string(),
            vec![
                Edge { from: "a".into(), to: "join".into(), source_handle: None },
                Edge { from: "b".into(), to: "join".into(), source_handle: None },
            ],
        );
        let mut status = HashMap::from([
            ("a".to_string(), NodeState::Completed(None)),
            ("b".to_string(), NodeState::Skipped),
            ("join".to_string(), NodeState::Pending),
        ]);

        recompute_ready(&node_ids, &inbound, &mut status);

        assert_eq!(status["join"], NodeState::Running);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(10);
        assert_eq!(backoff(1, base, cap), Duration::from_secs(1));
        assert_eq!(backoff(2, base, cap), Duration::from_secs(2));
        assert_eq!(backoff(3, base, cap), Duration::from_secs(4));
        assert_eq!(backoff(10, base, cap), cap);
    }
}
