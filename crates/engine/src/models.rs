//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like
//! in memory. They can be serialised to/from the JSONB `definition`
//! column of the `workflows` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// How a workflow is started.
///
/// Only `Manual` and `ResumeSignal` actually run through this engine;
/// `Webhook`/`Cron` describe *intent* recorded on the workflow definition —
/// whatever external scheduler owns them is responsible for eventually
/// calling `StartExecution`, which this engine does not provide on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Triggered by an incoming HTTP request to `/webhook/{path}`.
    Webhook {
        /// URL path segment that identifies this workflow.
        path: String,
    },
    /// Triggered manually via the REST API.
    Manual,
    /// Triggered on a cron schedule.
    Cron {
        /// Standard cron expression (5 fields).
        expression: String,
    },
}

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: String,
    /// Maps to a registered block type in the `BlockRegistry`.
    pub node_type: String,
    /// Arbitrary configuration passed to the node at execution time. String
    /// fields may contain `{{path.to.value}}` placeholders resolved against
    /// the interpolation scope before dispatch.
    pub config: serde_json::Value,
    /// Overrides the engine-wide default retry count for this node.
    #[serde(default)]
    pub retries: Option<u32>,
    /// Overrides the engine-wide default per-node timeout for this node.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge from one node to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    /// Which of the source node's output handles this edge follows. `None`
    /// matches any handle the source node fires (ordinary single-output
    /// nodes); `Some("true")`/`Some("false")` restricts the edge to a
    /// `CONDITION` branch.
    #[serde(default)]
    pub source_handle: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    pub trigger: Trigger,
    pub nodes: Vec<NodeDefinition>,
    pub edges: Vec<Edge>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(
        name: impl Into<String>,
        trigger: Trigger,
        nodes: Vec<NodeDefinition>,
        edges: Vec<Edge>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_user_id: Uuid::new_v4(),
            name: name.into(),
            trigger,
            nodes,
            edges,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}
