//! `SCHEDULE` — pass-through marker node. Cron/interval triggering lives
//! outside the execution engine entirely (something else decides *when* to
//! call `StartExecution`); by the time a `SCHEDULE` node is actually running
//! inside a graph it has nothing left to do but hand its input through.

use async_trait::async_trait;
use serde_json::Value;

use crate::traits::{ExecutionContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

pub struct ScheduleNode;

impl ScheduleNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ScheduleNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutableNode for ScheduleNode {
    async fn execute(&self, config: &Value, _ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::value(config.clone()))
    }
}
