//! `CONDITION` — the only block type that fires more than one possible
//! output handle (spec glossary: "fired handle"). Downstream edges declare a
//! `sourceHandle` of `"true"` or `"false"`; the executor only follows the
//! edge matching whichever handle this node fires.
//!
//! Config:
//! ```json
//! { "left": <value>, "operator": "eq", "right": <value> }
//! ```
//! `left`/`right` arrive already interpolated by the time this runs (spec
//! §9). `operator` defaults to `"truthy"`, which ignores `right` and just
//! checks `left`.

use async_trait::async_trait;
use serde_json::Value;

use crate::traits::{ExecutionContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

pub struct ConditionNode;

impl ConditionNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConditionNode {
    fn default() -> Self {
        Self::new()
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
}

fn evaluate(operator: &str, left: &Value, right: &Value) -> Result<bool, NodeError> {
    Ok(match operator {
        "truthy" => is_truthy(left),
        "falsy" => !is_truthy(left),
        "eq" => left == right,
        "neq" => left != right,
        "gt" => as_f64(left).zip(as_f64(right)).map(|(l, r)| l > r).unwrap_or(false),
        "gte" => as_f64(left).zip(as_f64(right)).map(|(l, r)| l >= r).unwrap_or(false),
        "lt" => as_f64(left).zip(as_f64(right)).map(|(l, r)| l < r).unwrap_or(false),
        "lte" => as_f64(left).zip(as_f64(right)).map(|(l, r)| l <= r).unwrap_or(false),
        "contains" => match (left, right) {
            (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
            (Value::Array(items), needle) => items.contains(needle),
            _ => false,
        },
        other => return Err(NodeError::BadConfig(format!("unknown CONDITION operator '{other}'"))),
    })
}

#[async_trait]
impl ExecutableNode for ConditionNode {
    async fn execute(&self, config: &Value, _ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let operator = config.get("operator").and_then(Value::as_str).unwrap_or("truthy");
        let left = config.get("left").cloned().unwrap_or(Value::Null);
        let right = config.get("right").cloned().unwrap_or(Value::Null);

        let result = evaluate(operator, &left, &right)?;
        let handle = if result { "true" } else { "false" };

        Ok(NodeOutput::with_handle(
            serde_json::json!({ "result": result }),
            handle,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NullLogSink;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            workflow_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            node_id: "n1".into(),
            user_id: Uuid::new_v4(),
            inputs: Value::Null,
            variables: Value::Null,
            logger: Arc::new(NullLogSink),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn fires_true_handle_on_match() {
        let node = ConditionNode::new();
        let out = node
            .execute(&json!({ "operator": "eq", "left": 1, "right": 1 }), &ctx())
            .await
            .unwrap();
        assert_eq!(out.handle.as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn fires_false_handle_on_mismatch() {
        let node = ConditionNode::new();
        let out = node
            .execute(&json!({ "operator": "eq", "left": 1, "right": 2 }), &ctx())
            .await
            .unwrap();
        assert_eq!(out.handle.as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn unknown_operator_is_bad_config() {
        let node = ConditionNode::new();
        let result = node.execute(&json!({ "operator": "nonsense" }), &ctx()).await;
        assert!(matches!(result, Err(NodeError::BadConfig(_))));
    }
}
