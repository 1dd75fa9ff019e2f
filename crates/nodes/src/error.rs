//! Node-level error type.

use thiserror::Error;

/// Errors returned by a node's `execute` method.
///
/// The Handler Runtime uses the variant to decide what happens next
/// (spec §4.5/§7):
/// - `Retryable` — the engine retries with exponential back-off, up to
///   `maxRetries`; exhaustion turns it into a permanent node failure.
/// - `Fatal`     — the node, and the execution, are marked failed immediately.
/// - `Cancelled` — a per-node or whole-workflow timeout, or an external
///   cancel; never retried, distinct from `Fatal` only in the reason
///   recorded (spec §7 keeps `Cancelled` a separate taxonomy entry from
///   `Permanent`).
/// - `Paused`    — not an error. The executor parks the execution awaiting
///   external resume data (used by approval / human-in-the-loop blocks).
/// - `BadConfig` — schema validation against the block's input schema
///   failed before the handler was even invoked.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    #[error("retryable node error: {0}")]
    Retryable(String),

    #[error("fatal node error: {0}")]
    Fatal(String),

    #[error("node execution cancelled (reason={reason})")]
    Cancelled { reason: String },

    #[error("node paused awaiting external resume: {request_id}")]
    Paused { request_id: String },

    #[error("invalid node config: {0}")]
    BadConfig(String),
}
