//! Dotted-path dereferencing over dynamic JSON documents.
//!
//! The single shared helper behind run-if gates, config input resolution,
//! and prompt templating.  Paths look like `rec.approved` or `items.0.id`;
//! array segments are numeric indices.

use serde_json::{Map, Value};

/// Resolve a dotted path inside one JSON value.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a dotted path against execution memory.
///
/// The first segment selects a memory binding (an alias, a node id, or the
/// synthetic `payload` key).  When it matches nothing, the whole path is
/// retried underneath `payload`, so `amount` and `payload.amount` both hit
/// the trigger payload.
pub fn lookup<'a>(memory: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let (first, rest) = match path.split_once('.') {
        Some((first, rest)) => (first, rest),
        None => (path, ""),
    };

    if let Some(bound) = memory.get(first) {
        return resolve(bound, rest);
    }

    memory.get("payload").and_then(|payload| resolve(payload, path))
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory() -> Map<String, Value> {
        let mut memory = Map::new();
        memory.insert("payload".into(), json!({ "amount": "1.5", "order": { "id": 42 } }));
        memory.insert("rec".into(), json!({ "approved": true, "tags": ["a", "b"] }));
        memory
    }

    #[test]
    fn resolves_nested_objects_and_arrays() {
        let doc = json!({ "a": { "b": [ { "c": 7 } ] } });
        assert_eq!(resolve(&doc, "a.b.0.c"), Some(&json!(7)));
        assert_eq!(resolve(&doc, "a.b.1"), None);
        assert_eq!(resolve(&doc, "a.x"), None);
    }

    #[test]
    fn lookup_prefers_memory_bindings() {
        let memory = memory();
        assert_eq!(lookup(&memory, "rec.approved"), Some(&json!(true)));
        assert_eq!(lookup(&memory, "rec.tags.1"), Some(&json!("b")));
        assert_eq!(lookup(&memory, "payload.amount"), Some(&json!("1.5")));
    }

    #[test]
    fn lookup_falls_back_to_payload_root() {
        let memory = memory();
        assert_eq!(lookup(&memory, "amount"), Some(&json!("1.5")));
        assert_eq!(lookup(&memory, "order.id"), Some(&json!(42)));
        assert_eq!(lookup(&memory, "missing.path"), None);
    }
}
