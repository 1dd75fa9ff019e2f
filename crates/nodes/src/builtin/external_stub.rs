//! Thin adapter nodes for the four external-collaborator block types
//! (spec §1: "AI-agent, blockchain wallet/price/swap"). Each just forwards
//! its config to the injected [`Collaborator`] and wraps the result, so
//! failure classification for an unconfigured or misbehaving SDK stays
//! uniform with every other block type.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::external::{Collaborator, CollaboratorKind};
use crate::traits::{ExecutionContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

struct CollaboratorNode {
    kind: CollaboratorKind,
    collaborator: Arc<dyn Collaborator>,
}

#[async_trait]
impl ExecutableNode for CollaboratorNode {
    async fn execute(&self, config: &Value, _ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
        self.collaborator
            .invoke(self.kind, config)
            .await
            .map(NodeOutput::value)
            .map_err(NodeError::Retryable)
    }
}

pub struct AiAgentNode(Arc<dyn Collaborator>);
pub struct WalletNode(Arc<dyn Collaborator>);
pub struct PriceNode(Arc<dyn Collaborator>);
pub struct SwapNode(Arc<dyn Collaborator>);

macro_rules! collaborator_node {
    ($name:ident, $kind:expr) => {
        impl $name {
            pub fn new(collaborator: Arc<dyn Collaborator>) -> Self {
                Self(collaborator)
            }
        }

        #[async_trait]
        impl ExecutableNode for $name {
            async fn execute(&self, config: &Value, ctx: &ExecutionContext) -> Result<NodeOutput, NodeError> {
                CollaboratorNode {
                    kind: $kind,
                    collaborator: self.0.clone(),
                }
                .execute(config, ctx)
                .await
            }
        }
    };
}

collaborator_node!(AiAgentNode, CollaboratorKind::AiAgent);
collaborator_node!(WalletNode, CollaboratorKind::Wallet);
collaborator_node!(PriceNode, CollaboratorKind::Price);
collaborator_node!(SwapNode, CollaboratorKind::Swap);
