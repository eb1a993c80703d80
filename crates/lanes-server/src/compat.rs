//! Param key normalization.
//!
//! Entity payloads deserialize camelCase keys (`dueDate`, `parentId`). Some
//! clients send snake_case; those keys are rewritten before dispatch. When
//! both spellings are present the camelCase one wins.

use serde_json::{Map, Value};

/// Rewrite snake_case object keys to camelCase, recursively.
pub fn normalize_params(params: &Value) -> Value {
    match params {
        Value::Object(obj) => {
            let mut result = Map::with_capacity(obj.len());
            for (key, value) in obj {
                let normalized = normalize_params(value);
                if key.contains('_') {
                    let camel = snake_to_camel(key);
                    if !obj.contains_key(&camel) {
                        let _ = result.insert(camel, normalized);
                    }
                } else {
                    let _ = result.insert(key.clone(), normalized);
                }
            }
            Value::Object(result)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_params).collect()),
        other => other.clone(),
    }
}

/// `due_date` -> `dueDate`. Leading underscores are kept.
pub fn snake_to_camel(key: &str) -> String {
    let body = key.trim_start_matches('_');
    let mut out = String::with_capacity(key.len());
    out.push_str(&key[..key.len() - body.len()]);
    let mut upper = false;
    for c in body.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
