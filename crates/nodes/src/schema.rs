//! A small declarative, JSON-Schema-equivalent description of a block's
//! config, used by the Registry/Handler Runtime boundary (spec §4.4/§4.5)
//! to reject `BadConfig` before a handler is ever invoked.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::NodeError;

/// The accepted primitive kinds for a single config field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Object,
    Array,
    /// Accept anything — used for passthrough/opaque fields.
    Any,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::Any => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub kind: FieldKind,
    pub required: bool,
}

/// A flat field-name -> `Field` map. Good enough for the config shapes
/// block handlers in this engine actually need; nested schemas are not
/// modeled (variable interpolation is likewise deliberately string/path-only,
/// spec §9).
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: BTreeMap<String, Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), Field { kind, required: true });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(name.into(), Field { kind, required: false });
        self
    }

    /// Accept any object shape (used by nodes, like `CUSTOM`, whose config
    /// is entirely user-defined).
    pub fn any() -> Self {
        Self::default()
    }

    pub fn validate(&self, config: &Value) -> Result<(), NodeError> {
        if self.fields.is_empty() {
            return Ok(());
        }

        let obj = config
            .as_object()
            .ok_or_else(|| NodeError::BadConfig("config must be a JSON object".into()))?;

        for (name, field) in &self.fields {
            match obj.get(name) {
                Some(value) if !field.kind.matches(value) => {
                    return Err(NodeError::BadConfig(format!(
                        "field '{name}' has the wrong type (expected {:?})",
                        field.kind
                    )));
                }
                None if field.required => {
                    return Err(NodeError::BadConfig(format!("missing required field '{name}'")));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_field_is_rejected() {
        let schema = Schema::new().required("url", FieldKind::String);
        assert!(schema.validate(&json!({})).is_err());
    }

    #[test]
    fn wrong_type_is_rejected() {
        let schema = Schema::new().required("url", FieldKind::String);
        assert!(schema.validate(&json!({"url": 5})).is_err());
    }

    #[test]
    fn matching_config_is_accepted() {
        let schema = Schema::new()
            .required("url", FieldKind::String)
            .optional("timeoutMs", FieldKind::Number);
        assert!(schema.validate(&json!({"url": "https://example.com"})).is_ok());
    }

    #[test]
    fn any_schema_accepts_everything() {
        assert!(Schema::any().validate(&json!({"whatever": true})).is_ok());
    }
}
