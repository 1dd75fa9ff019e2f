//! Variable interpolation (spec §9): `{{path.to.value}}` placeholders in a
//! node's config are resolved against a merged scope of
//! `{ workflowInput, nodeOutputs: { <nodeId>: <output> } }` before dispatch.
//!
//! Deliberately minimal: string-only, dot/array-index paths, no
//! expressions or function calls. An unresolved path is left verbatim
//! rather than erroring, so a typo in a rarely-hit branch doesn't take
//! down the whole execution.

use serde_json::{Map, Value};

/// Build the interpolation scope for a node about to run.
pub fn build_scope(workflow_input: &Value, node_outputs: &Map<String, Value>) -> Value {
    Value::Object(Map::from_iter([
        ("workflowInput".to_string(), workflow_input.clone()),
        ("nodeOutputs".to_string(), Value::Object(node_outputs.clone())),
    ]))
}

/// Recursively resolve every string in `value` against `scope`.
pub fn interpolate_value(value: &Value, scope: &Value) -> Value {
    match value {
        Value::String(s) => interpolate_string(s, scope),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| interpolate_value(v, scope)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_path<'a>(scope: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = scope;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// A string that is *entirely* one placeholder resolves to the underlying
/// JSON value (preserving type); a string with a placeholder embedded in
/// other text gets the resolved value stringified and substituted inline.
fn interpolate_string(s: &str, scope: &Value) -> Value {
    if let Some(path) = whole_placeholder(s) {
        return match resolve_path(scope, path) {
            Some(resolved) => resolved.clone(),
            None => Value::String(s.to_string()),
        };
    }

    let mut out = String::new();
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        match rest[start..].find("}}") {
            Some(rel_end) => {
                let end = start + rel_end;
                let path = rest[start + 2..end].trim();
                match resolve_path(scope, path) {
                    Some(v) => out.push_str(&plain_string(v)),
                    None => out.push_str(&rest[start..end + 2]),
                }
                rest = &rest[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    Value::String(out)
}

fn whole_placeholder(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.len() > 4 && trimmed.starts_with("{{") && trimmed.ends_with("}}") {
        let inner = &trimmed[2..trimmed.len() - 2];
        if !inner.contains("{{") {
            return Some(inner.trim());
        }
    }
    None
}

fn plain_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> Value {
        json!({
            "workflowInput": { "name": "ada" },
            "nodeOutputs": { "fetch": { "status": 200, "body": { "id": 7 } } }
        })
    }

    #[test]
    fn whole_string_placeholder_preserves_type() {
        let resolved = interpolate_value(&json!("{{nodeOutputs.fetch.status}}"), &scope());
        assert_eq!(resolved, json!(200));
    }

    #[test]
    fn embedded_placeholder_is_stringified() {
        let resolved = interpolate_value(&json!("hello {{workflowInput.name}}!"), &scope());
        assert_eq!(resolved, json!("hello ada!"));
    }

    #[test]
    fn unresolved_path_is_left_verbatim() {
        let resolved = interpolate_value(&json!("{{nodeOutputs.missing.field}}"), &scope());
        assert_eq!(resolved, json!("{{nodeOutputs.missing.field}}"));
    }

    #[test]
    fn nested_objects_and_arrays_are_walked() {
        let resolved = interpolate_value(
            &json!({ "a": ["{{workflowInput.name}}", { "b": "{{nodeOutputs.fetch.body.id}}" }] }),
            &scope(),
        );
        assert_eq!(resolved, json!({ "a": ["ada", { "b": 7 }] }));
    }

    #[test]
    fn non_string_values_pass_through_unchanged() {
        let resolved = interpolate_value(&json!({ "n": 42, "b": true, "x": null }), &scope());
        assert_eq!(resolved, json!({ "n": 42, "b": true, "x": null }));
    }
}
