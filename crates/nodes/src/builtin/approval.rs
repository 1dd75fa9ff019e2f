//! `APPROVAL` — human-in-the-loop pause point.
//!
//! Always returns [`NodeError::Paused`]; it never completes on its own.
//! The executor reacts to that by recording a `Pause` row and parking the
//! execution (spec §4.6 scenario 4) until something external calls
//! `ResumeExecution` with `resumeData`, at which point the executor treats
//! this node's output as `resumeData` directly rather than re-invoking it.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::traits::{ExecutionContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

pub struct ApprovalNode;

impl ApprovalNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ApprovalNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutableNode for ApprovalNode {
    async fn execute(&self, _config: &Value, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        Err(NodeError::Paused {
            request_id: format!("{}:{}", ctx.execution_id, Uuid::new_v4()),
        })
    }
}
