//! Built-in block handlers (spec §1) and the registry constructor that
//! wires them all up.

mod approval;
mod condition;
mod custom;
mod data_transform;
mod external_stub;
mod http_request;
mod notify;
mod schedule;

pub use approval::ApprovalNode;
pub use condition::ConditionNode;
pub use custom::CustomNode;
pub use data_transform::DataTransformNode;
pub use external_stub::{AiAgentNode, PriceNode, SwapNode, WalletNode};
pub use http_request::HttpRequestNode;
pub use notify::NotifyNode;
pub use schedule::ScheduleNode;

use std::sync::Arc;

use crate::external::{Collaborator, UnavailableCollaborator};
use crate::schema::{FieldKind, Schema};
use crate::registry::BlockRegistry;

/// Build a registry preloaded with every built-in block type, using
/// `collaborator` for the AI/wallet/price/swap adapters. Callers in
/// production wire a real SDK-backed collaborator; tests and `serve
/// --dev` can pass `Arc::new(UnavailableCollaborator)`.
pub fn builtin_registry(collaborator: Arc<dyn Collaborator>) -> BlockRegistry {
    let mut registry = BlockRegistry::new();

    registry.register(
        "HTTP_REQUEST",
        Arc::new(HttpRequestNode::new()),
        Schema::new().required("url", FieldKind::String),
    );

    registry.register("NOTIFY", Arc::new(NotifyNode::new()), Schema::any());

    registry.register("SCHEDULE", Arc::new(ScheduleNode::new()), Schema::any());

    registry.register(
        "CONDITION",
        Arc::new(ConditionNode::new()),
        Schema::new().optional("operator", FieldKind::String),
    );

    registry.register(
        "DATA_TRANSFORM",
        Arc::new(DataTransformNode::new()),
        Schema::new().required("mapping", FieldKind::Object),
    );

    registry.register(
        "CUSTOM",
        Arc::new(CustomNode::new()),
        Schema::new().required("template", FieldKind::Object),
    );

    registry.register("APPROVAL", Arc::new(ApprovalNode::new()), Schema::any());

    registry.register("AI_AGENT", Arc::new(AiAgentNode::new(collaborator.clone())), Schema::any());
    registry.register("WALLET", Arc::new(WalletNode::new(collaborator.clone())), Schema::any());
    registry.register("PRICE", Arc::new(PriceNode::new(collaborator.clone())), Schema::any());
    registry.register("SWAP", Arc::new(SwapNode::new(collaborator)), Schema::any());

    registry
}

/// Convenience for tests and dev-mode `serve` invocations that never need a
/// real external SDK.
pub fn builtin_registry_without_collaborators() -> BlockRegistry {
    builtin_registry(Arc::new(UnavailableCollaborator))
}
