//! The `ExecutableNode` trait — the contract every block handler must
//! fulfil (spec §4.5):
//!
//! ```text
//! execute(node, ctx) -> result
//! ctx = { executionId, nodeId, inputs, userId, variables, logger, cancel }
//! ```

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::NodeError;

/// Severity of a single structured log line emitted by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Sink a handler writes log lines to. The Handler Runtime supplies an
/// implementation that both persists the line (via the Store) and emits it
/// on the Event Hub; nodes never talk to either directly.
pub trait NodeLogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, metadata: Value);
}

/// A sink that discards everything — used by tests that don't care about
/// log output.
pub struct NullLogSink;

impl NodeLogSink for NullLogSink {
    fn log(&self, _level: LogLevel, _message: &str, _metadata: Value) {}
}

/// Shared context passed to every node during execution.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Clone)]
pub struct ExecutionContext {
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub user_id: Uuid,
    /// This node's already-validated, already-interpolated input.
    pub inputs: Value,
    /// The full interpolation scope available at dispatch time:
    /// `{ "workflowInput": ..., "nodeOutputs": { <nodeId>: ... } }`.
    pub variables: Value,
    pub logger: std::sync::Arc<dyn NodeLogSink>,
    /// Cancelled when the execution is cancelled or hits its workflow-level
    /// timeout; handlers doing I/O should race against it.
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("workflow_id", &self.workflow_id)
            .field("execution_id", &self.execution_id)
            .field("node_id", &self.node_id)
            .field("user_id", &self.user_id)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// What a successful node invocation produced.
#[derive(Debug, Clone)]
pub struct NodeOutput {
    pub value: Value,
    /// Name of the output handle this invocation fired (the glossary's
    /// "fired handle"), e.g. `"true"`/`"false"` for `CONDITION`. `None`
    /// means the node has a single, unnamed output handle.
    pub handle: Option<String>,
}

impl NodeOutput {
    pub fn value(value: Value) -> Self {
        Self { value, handle: None }
    }

    pub fn with_handle(value: Value, handle: impl Into<String>) -> Self {
        Self {
            value,
            handle: Some(handle.into()),
        }
    }
}

/// The core node trait.
///
/// All built-in nodes and custom/plugin nodes alike must implement this.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Execute the node against its resolved `config` and the upstream
    /// `inputs` already wired in by the executor.
    async fn execute(
        &self,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutput, NodeError>;
}
