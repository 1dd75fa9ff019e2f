//! `CUSTOM` — delegates to a workflow-author-supplied template rather than
//! executing arbitrary code (arbitrary code execution is explicitly out of
//! scope). The template is itself just a field mapping, identical in shape
//! to [`crate::builtin::data_transform::DataTransformNode`]'s config, stored
//! under the block's own `template` field so a single `CUSTOM` registry
//! entry can serve every custom block in a workflow without per-workflow
//! registration.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::traits::{ExecutionContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

pub struct CustomNode;

impl CustomNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CustomNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutableNode for CustomNode {
    async fn execute(&self, config: &Value, _ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let template = config
            .get("template")
            .and_then(Value::as_object)
            .ok_or_else(|| NodeError::BadConfig("CUSTOM requires an object 'template'".into()))?;

        let mut out = Map::new();
        for (key, value) in template {
            out.insert(key.clone(), value.clone());
        }

        Ok(NodeOutput::value(Value::Object(out)))
    }
}
