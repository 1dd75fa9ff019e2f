//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference { node_id: String, side: &'static str },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    /// A persisted `workflows.definition` failed to validate on load, after
    /// having (presumably) passed validation at save time. Defensive check
    /// per spec §9's note that the builder is out of scope but this engine
    /// must not trust its output blindly.
    #[error("workflow is invalid: {0}")]
    BadWorkflow(String),

    // ------ Execution errors ------
    /// A node's input/config failed schema validation; the handler was
    /// never invoked.
    #[error("node '{node_id}' has invalid config: {message}")]
    NodeBadConfig { node_id: String, message: String },

    /// A node failed with a fatal error; the whole execution is aborted.
    #[error("node '{node_id}' failed fatally: {message}")]
    NodeFatal { node_id: String, message: String },

    /// A node's retryable error was exhausted.
    #[error("node '{node_id}' exceeded retry limit: {message}")]
    NodeRetryExhausted { node_id: String, message: String },

    /// A node requested to run has no registered handler.
    #[error("no handler registered for block type '{0}'")]
    UnknownBlockType(String),

    /// The whole-workflow execution deadline elapsed.
    #[error("execution exceeded its workflow-level timeout")]
    WorkflowTimeout,

    /// The execution was cancelled externally.
    #[error("execution was cancelled")]
    Cancelled,

    /// Execution is parked awaiting external resume data; not a failure.
    #[error("execution paused awaiting resume (request {request_id})")]
    Paused { request_id: String },

    /// A control-plane request was well-formed but inapplicable to the
    /// execution's current state (spec §6: `retry` on a non-failed/paused
    /// execution, `cancel` on an already-terminal one). Maps to HTTP 409.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller's subscription has exhausted its period quota (spec
    /// §4.7 step 2). Maps to HTTP 403.
    #[error("subscription {subscription_id} has exceeded its execution quota")]
    QuotaExceeded { subscription_id: uuid::Uuid },

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    /// Queue/circuit-breaker error from the queue crate.
    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
}
