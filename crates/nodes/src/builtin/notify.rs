//! `NOTIFY` — stub delivery node. Real notification channels (email, SMS,
//! push, Slack...) are an external concern explicitly out of scope here;
//! this handler only records that a notification *would* be sent and
//! succeeds, so graphs that include a notify step can still be executed
//! end to end in this engine.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::traits::{ExecutionContext, LogLevel, NodeOutput};
use crate::{ExecutableNode, NodeError};

pub struct NotifyNode;

impl NotifyNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NotifyNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutableNode for NotifyNode {
    async fn execute(&self, config: &Value, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        let channel = config.get("channel").and_then(Value::as_str).unwrap_or("none");
        let message = config.get("message").and_then(Value::as_str).unwrap_or("");

        ctx.logger.log(
            LogLevel::Info,
            &format!("NOTIFY stub: would send via '{channel}': {message}"),
            json!({ "channel": channel }),
        );

        Ok(NodeOutput::value(json!({ "delivered": false, "channel": channel })))
    }
}
