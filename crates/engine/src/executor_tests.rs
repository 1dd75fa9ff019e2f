//! Unit tests for workflow validation and the node execution contract.
//!
//! `WorkflowExecutor` itself talks to a real `sqlx::PgPool` for every step
//! (opening/closing `node_executions` rows, flipping execution status), so
//! it isn't exercised here without a live Postgres instance. These tests
//! cover what doesn't need one: DAG validation and `ExecutableNode`
//! dispatch via `MockNode`. The scheduler's pure logic (`recompute_ready`,
//! backoff) is tested in `executor`'s own test module instead, since it's
//! private to that file.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use engine::dag::validate_dag;
use engine::models::{Edge, NodeDefinition};
use engine::{Trigger, Workflow};
use nodes::traits::{ExecutionContext, NullLogSink};
use nodes::mock::MockNode;
use nodes::{ExecutableNode, NodeError};

fn edge(from: &str, to: &str) -> Edge {
    Edge {
        from: from.into(),
        to: to.into(),
        source_handle: None,
    }
}

fn node(id: &str) -> NodeDefinition {
    NodeDefinition {
        id: id.into(),
        node_type: "mock".into(),
        config: Value::Null,
        retries: None,
        timeout_ms: None,
    }
}

fn linear_workflow(ids: &[&str]) -> Workflow {
    let nodes: Vec<NodeDefinition> = ids.iter().map(|id| node(id)).collect();
    let edges: Vec<Edge> = ids.windows(2).map(|w| edge(w[0], w[1])).collect();
    Workflow::new("test-linear", Trigger::Manual, nodes, edges)
}

fn make_ctx(workflow_id: Uuid, node_id: &str) -> ExecutionContext {
    ExecutionContext {
        workflow_id,
        execution_id: Uuid::new_v4(),
        node_id: node_id.into(),
        user_id: Uuid::new_v4(),
        inputs: json!({}),
        variables: json!({ "workflowInput": {}, "nodeOutputs": {} }),
        logger: Arc::new(NullLogSink),
        cancel: CancellationToken::new(),
    }
}

// ============================================================
// DAG validation
// ============================================================

#[test]
fn linear_workflow_validates_and_sorts_correctly() {
    let wf = linear_workflow(&["step_a", "step_b", "step_c"]);
    let sorted = validate_dag(&wf).expect("should be a valid DAG");
    assert_eq!(sorted, vec!["step_a", "step_b", "step_c"]);
}

#[test]
fn cycle_in_linear_workflow_is_detected() {
    let mut wf = linear_workflow(&["x", "y", "z"]);
    wf.edges.push(edge("z", "x"));
    assert!(validate_dag(&wf).is_err());
}

#[test]
fn missing_node_reference_is_rejected() {
    let wf = Workflow::new(
        "bad",
        Trigger::Manual,
        vec![node("a")],
        vec![edge("a", "b")],
    );
    assert!(validate_dag(&wf).is_err());
}

// ============================================================
// ExecutableNode dispatch via MockNode
// ============================================================

#[tokio::test]
async fn three_node_pipeline_output_propagation() {
    let wf = linear_workflow(&["node_a", "node_b", "node_c"]);
    let sorted = validate_dag(&wf).expect("valid dag");

    let node_a = MockNode::returning("node_a", json!({ "step": 1 }));
    let node_b = MockNode::returning("node_b", json!({ "step": 2 }));
    let node_c = MockNode::returning("node_c", json!({ "step": 3 }));
    let registry: std::collections::HashMap<&str, &MockNode> =
        [("node_a", &node_a), ("node_b", &node_b), ("node_c", &node_c)].into_iter().collect();

    let mut current_input = json!({ "origin": "trigger" });
    let mut execution_order = Vec::new();

    for node_id in &sorted {
        let node = registry[node_id.as_str()];
        let ctx = make_ctx(wf.id, node_id);
        let output = node.execute(&current_input, &ctx).await.expect("node should succeed");
        execution_order.push(node_id.clone());
        current_input = output.value;
    }

    assert_eq!(execution_order, vec!["node_a", "node_b", "node_c"]);
    assert_eq!(node_a.call_count(), 1);
    assert_eq!(node_b.call_count(), 1);
    assert_eq!(node_c.call_count(), 1);
    assert_eq!(current_input["node"], "node_c");
    assert_eq!(current_input["step"], 3);
}

#[tokio::test]
async fn fatal_node_error_stops_pipeline() {
    let wf = linear_workflow(&["ok", "boom", "never"]);
    let sorted = validate_dag(&wf).expect("valid dag");

    let ok = MockNode::returning("ok", json!({ "ok": true }));
    let boom = MockNode::failing_fatal("boom", "something broke irreparably");
    let never = MockNode::returning("never", json!({ "should": "not run" }));
    let registry: std::collections::HashMap<&str, &dyn ExecutableNode> = [
        ("ok", &ok as &dyn ExecutableNode),
        ("boom", &boom as &dyn ExecutableNode),
        ("never", &never as &dyn ExecutableNode),
    ]
    .into_iter()
    .collect();

    let mut current_input = json!({});
    let mut hit_fatal = false;

    for node_id in &sorted {
        let node = registry[node_id.as_str()];
        let ctx = make_ctx(wf.id, node_id);
        match node.execute(&current_input, &ctx).await {
            Ok(out) => current_input = out.value,
            Err(e) => {
                assert_eq!(node_id, "boom");
                assert!(matches!(e, NodeError::Fatal(_)));
                hit_fatal = true;
                break;
            }
        }
    }

    assert!(hit_fatal, "expected a fatal error");
    assert_eq!(never.call_count(), 0);
}

#[tokio::test]
async fn retryable_node_error_is_returned_correctly() {
    let node = MockNode::failing_retryable("flaky", "transient failure");
    let ctx = make_ctx(Uuid::new_v4(), "flaky");

    let result = node.execute(&json!({}), &ctx).await;
    assert!(matches!(result, Err(NodeError::Retryable(_))));
    assert_eq!(node.call_count(), 1);
}

#[tokio::test]
async fn branching_node_fires_named_handle() {
    let node = MockNode::returning_handle("cond", json!({ "matched": true }), "true");
    let ctx = make_ctx(Uuid::new_v4(), "cond");

    let output = node.execute(&json!({}), &ctx).await.expect("should succeed");
    assert_eq!(output.handle.as_deref(), Some("true"));
    assert_eq!(output.value["matched"], true);
}

#[tokio::test]
async fn pausing_node_returns_request_id() {
    let node = MockNode::pausing("approval", "req-123");
    let ctx = make_ctx(Uuid::new_v4(), "approval");

    let result = node.execute(&json!({}), &ctx).await;
    match result {
        Err(NodeError::Paused { request_id }) => assert_eq!(request_id, "req-123"),
        other => panic!("expected Paused, got {other:?}"),
    }
}
