//! `DATA_TRANSFORM` — reshapes its input according to a declarative field
//! mapping. This is deliberately not a scripting sandbox (spec Non-goals
//! exclude arbitrary user code execution outside `CUSTOM`); it only
//! supports picking, renaming and literal-injecting fields.
//!
//! Config:
//! ```json
//! { "mapping": { "outputField": "{{some.path}}", "literalField": 42 } }
//! ```
//! Values under `mapping` have already been interpolated by the executor
//! before this handler ever sees them (spec §9), so this node just copies
//! them into a fresh object under their declared output key.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::traits::{ExecutionContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

pub struct DataTransformNode;

impl DataTransformNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DataTransformNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutableNode for DataTransformNode {
    async fn execute(&self, config: &Value, _ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let mapping = config
            .get("mapping")
            .and_then(Value::as_object)
            .ok_or_else(|| NodeError::BadConfig("DATA_TRANSFORM requires an object 'mapping'".into()))?;

        let mut out = Map::new();
        for (key, value) in mapping {
            out.insert(key.clone(), value.clone());
        }

        Ok(NodeOutput::value(Value::Object(out)))
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

    #[tokio::test]
    async fn copies_mapping_into_output() {
        let node = DataTransformNode::new();
        let ctx = ExecutionContext {
            workflow_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            node_id: "n1".into(),
            user_id: Uuid::new_v4(),
            inputs: Value::Null,
            variables: Value::Null,
            logger: Arc::new(NullLogSink),
            cancel: CancellationToken::new(),
        };

        let out = node
            .execute(&json!({ "mapping": { "greeting": "hello", "count": 3 } }), &ctx)
            .await
            .unwrap();

        assert_eq!(out.value, json!({ "greeting": "hello", "count": 3 }));
    }
}
