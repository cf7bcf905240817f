//! Deterministic key order for generated schemas.

use serde_json::{Map, Value};

/// Sort object keys recursively.
///
/// The keys of a `properties` object keep field order, and `default` values
/// are left exactly as written.
pub fn sort_schema(value: Value) -> Value {
    sort_with_parent(value, None)
}

fn sort_with_parent(value: Value, parent: Option<&str>) -> Value {
    match value {
        Value::Object(object) => {
            let keep_order = matches!(parent, Some("properties" | "default"));
            let mut entries: Vec<(String, Value)> = object.into_iter().collect();
            if !keep_order {
                entries.sort_by(|(left, _), (right, _)| left.cmp(right));
            }
            let mut sorted = Map::with_capacity(entries.len());
            for (key, value) in entries {
                let value = if key == "default" {
                    value
                } else {
                    sort_with_parent(value, Some(&key))
                };
                sorted.insert(key, value);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| sort_with_parent(item, parent))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn keys(value: &Value) -> Vec<&str> {
        value
            .as_object()
            .map(|object| object.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[test]
    fn properties_keep_field_order() {
        let schema = sort_schema(json!({
            "type": "object",
            "title": "M",
            "properties": {
                "zeta": {"type": "string", "title": "Zeta"},
                "alpha": {"type": "integer", "title": "Alpha", "default": {"b": 1, "a": 2}}
            }
        }));
        assert_eq!(keys(&schema), vec!["properties", "title", "type"]);
        let properties = schema.get("properties").unwrap();
        assert_eq!(keys(properties), vec!["zeta", "alpha"]);
        let alpha = properties.get("alpha").unwrap();
        assert_eq!(keys(alpha), vec!["default", "title", "type"]);
        assert_eq!(keys(alpha.get("default").unwrap()), vec!["b", "a"]);
    }

    #[test]
    fn sorting_is_idempotent() {
        let schema = json!({"b": [{"y": 1, "x": 2}], "a": {"$ref": "#/$defs/A"}});
        let once = sort_schema(schema);
        let twice = sort_schema(once.clone());
        assert_eq!(once, twice);
        assert_eq!(keys(once.get("b").and_then(|b| b.get(0)).unwrap()), vec!["x", "y"]);
    }
}
