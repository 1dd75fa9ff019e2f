//! `ExecutionJob` envelope — the message shape carried by every channel
//! (spec §2, §6). JSON, versioned with a `v` field so the wire format can
//! evolve without breaking in-flight messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What kind of work this envelope asks the executor to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Start,
    Resume,
    RetryNode,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Resume => write!(f, "resume"),
            Self::RetryNode => write!(f, "retry-node"),
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "resume" => Ok(Self::Resume),
            "retry-node" => Ok(Self::RetryNode),
            other => Err(format!("unknown job kind: {other}")),
        }
    }
}

/// The wire envelope for one unit of dispatcher work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope format version; bump when the shape changes.
    pub v: u32,
    pub job_id: Uuid,
    pub kind: JobKind,
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub user_id: Uuid,
    /// Which redelivery attempt this is, starting at 0.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    /// `{nodeId}` for `retry-node`; empty object otherwise.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: JobKind, execution_id: Uuid, workflow_id: Uuid, user_id: Uuid) -> Self {
        Self {
            v: 1,
            job_id: Uuid::new_v4(),
            kind,
            execution_id,
            workflow_id,
            user_id,
            attempt: 0,
            enqueued_at: Utc::now(),
            payload: Value::Object(Default::default()),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn redelivery(&self) -> Self {
        let mut next = self.clone();
        next.job_id = Uuid::new_v4();
        next.attempt += 1;
        next.enqueued_at = Utc::now();
        next
    }
}
