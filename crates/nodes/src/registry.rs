//! The Block Registry (spec §4.4) — a process-wide, read-mostly map from a
//! block's declared `type` string to the handler that implements it.
//!
//! Node `type` lookups are case-insensitive (workflow authors and the
//! external graph-generation collaborator disagree on casing in practice),
//! so the registry normalizes on insert and on lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::schema::Schema;
use crate::traits::ExecutableNode;

/// Everything the executor needs to know about a registered block type
/// besides how to run it.
#[derive(Clone)]
pub struct BlockDescriptor {
    pub block_type: String,
    pub handler: Arc<dyn ExecutableNode>,
    pub config_schema: Schema,
}

/// Process-wide map of block type -> handler.
///
/// Construction happens once at startup (see `nodes::registry::builtin`);
/// the engine holds one `Arc<BlockRegistry>` shared across every execution.
#[derive(Default, Clone)]
pub struct BlockRegistry {
    descriptors: HashMap<String, BlockDescriptor>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        block_type: impl Into<String>,
        handler: Arc<dyn ExecutableNode>,
        config_schema: Schema,
    ) -> &mut Self {
        let block_type = block_type.into();
        let key = normalize(&block_type);
        self.descriptors.insert(
            key,
            BlockDescriptor {
                block_type,
                handler,
                config_schema,
            },
        );
        self
    }

    pub fn get(&self, block_type: &str) -> Option<&BlockDescriptor> {
        self.descriptors.get(&normalize(block_type))
    }

    pub fn contains(&self, block_type: &str) -> bool {
        self.descriptors.contains_key(&normalize(block_type))
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn normalize(block_type: &str) -> String {
    block_type.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNode;
    use serde_json::json;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut registry = BlockRegistry::new();
        registry.register(
            "HttpRequest",
            Arc::new(MockNode::returning("http", json!({}))),
            Schema::any(),
        );

        assert!(registry.get("httprequest").is_some());
        assert!(registry.get("HTTPREQUEST").is_some());
        assert!(registry.get(" HttpRequest ").is_some());
        assert!(registry.get("unknown").is_none());
    }
}
