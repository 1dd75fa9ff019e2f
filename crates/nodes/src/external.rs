//! Seam for the SDK integrations this engine deliberately does not own:
//! AI-agent prompting, wallet custody, price feeds, and on-chain swaps are
//! all out of scope as concrete integrations (spec §1's Non-goals), but the
//! graph model still needs block types that route to them so a workflow
//! author can wire a step up to one. `Collaborator` is the trait seam; any
//! concrete SDK lives outside this crate and is injected at registration
//! time.

use async_trait::async_trait;
use serde_json::Value;

/// One external, non-deterministic capability a block can delegate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaboratorKind {
    AiAgent,
    Wallet,
    Price,
    Swap,
}

#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn invoke(&self, kind: CollaboratorKind, config: &Value) -> Result<Value, String>;
}

/// A collaborator that always fails, for registries built without a real
/// integration wired up (e.g. dev/test environments).
pub struct UnavailableCollaborator;

#[async_trait]
impl Collaborator for UnavailableCollaborator {
    async fn invoke(&self, kind: CollaboratorKind, _config: &Value) -> Result<Value, String> {
        Err(format!("{kind:?} collaborator is not configured"))
    }
}
