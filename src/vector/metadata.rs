//! Conversions between structured metadata and the shapes each vector store
//! accepts.

use serde_json::{json, Map, Value};

use crate::types::Fields;

/// Suffix marking a value that had to be stored as encoded JSON.
const JSON_SUFFIX: &str = "#json";

/// Flatten nested objects into dotted keys. Arrays of strings and scalars are
/// kept as-is; any other array is stored as a JSON string under
/// `<key>#json`. Nulls are dropped.
pub fn flatten(fields: &Fields) -> Fields {
    let mut out = Map::new();
    for (key, value) in fields {
        flatten_into(key, value, &mut out);
    }
    out
}

fn flatten_into(key: &str, value: &Value, out: &mut Fields) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (k, v) in map {
                flatten_into(&format!("{key}.{k}"), v, out);
            }
        }
        Value::Array(items) if items.iter().all(Value::is_string) => {
            out.insert(key.to_string(), value.clone());
        }
        Value::Array(_) => {
            out.insert(format!("{key}{JSON_SUFFIX}"), Value::String(value.to_string()));
        }
        scalar => {
            out.insert(key.to_string(), scalar.clone());
        }
    }
}

/// Inverse of [`flatten`]. Whole floats are narrowed back to integers, since
/// stores that keep every number as a double lose that distinction.
pub fn unflatten(flat: &Fields) -> Fields {
    let mut out = Map::new();
    for (key, value) in flat {
        let (key, value) = match key.strip_suffix(JSON_SUFFIX) {
            Some(stripped) => {
                let decoded = value
                    .as_str()
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or_else(|| value.clone());
                (stripped, decoded)
            }
            None => (key.as_str(), narrow(value)),
        };
        insert_path(&mut out, key, value);
    }
    out
}

fn narrow(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= 0.0 && f <= u64::MAX as f64 => json!(f as u64),
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 => json!(f as i64),
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(narrow).collect()),
        _ => value.clone(),
    }
}

fn insert_path(out: &mut Fields, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            out.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = out
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Qdrant filter requiring every (flattened) key to match.
pub fn qdrant_filter(filter: &Fields) -> Option<Value> {
    let conditions: Vec<Value> = flatten_filter(filter)
        .into_iter()
        .map(|(key, value)| match value {
            Value::Array(items) => json!({"key": key, "match": {"any": items}}),
            Value::Number(n) if n.is_f64() => {
                json!({"key": key, "range": {"gte": n, "lte": n}})
            }
            other => json!({"key": key, "match": {"value": other}}),
        })
        .collect();
    if conditions.is_empty() {
        None
    } else {
        Some(json!({"must": conditions}))
    }
}

/// Pinecone metadata filter requiring every (flattened) key to match.
pub fn pinecone_filter(filter: &Fields) -> Option<Value> {
    let clauses: Map<String, Value> = flatten_filter(filter)
        .into_iter()
        .map(|(key, value)| match value {
            Value::Array(items) => (key, json!({"$in": items})),
            other => (key, json!({"$eq": other})),
        })
        .collect();
    if clauses.is_empty() {
        None
    } else {
        Some(Value::Object(clauses))
    }
}

fn flatten_filter(filter: &Fields) -> Vec<(String, Value)> {
    let mut out = Map::new();
    for (key, value) in filter {
        flatten_filter_into(key, value, &mut out);
    }
    out.into_iter().collect()
}

fn flatten_filter_into(key: &str, value: &Value, out: &mut Fields) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (k, v) in map {
                flatten_filter_into(&format!("{key}.{k}"), v, out);
            }
        }
        other => {
            out.insert(key.to_string(), other.clone());
        }
    }
}
