//! Path splitting and JSON tree navigation for the in-memory store.

use serde_json::Map;

use super::{StoreError, Value};

/// Split a `/`-separated path into segments, rejecting empty segments.
pub fn split_path(path: &str) -> Result<Vec<String>, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split('/')
        .map(|segment| {
            if segment.is_empty() {
                Err(StoreError::InvalidPath(path.to_string()))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

/// Whether one path is a prefix of the other (including equality).
pub(crate) fn related(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

pub(crate) fn get<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(segment)?;
    }
    if node.is_null() {
        None
    } else {
        Some(node)
    }
}

/// Set `value` at `segments`, creating intermediate objects. A `None` or
/// empty value removes the key and prunes empty parents.
pub(crate) fn set(root: &mut Value, segments: &[String], value: Option<Value>) {
    let value = value.map(normalize).filter(|v| !is_empty(v));
    let Some((last, parents)) = segments.split_last() else {
        *root = value.unwrap_or_else(|| Value::Object(Map::new()));
        return;
    };

    match value {
        Some(value) => {
            let mut node = root;
            for segment in parents {
                if !node.is_object() {
                    *node = Value::Object(Map::new());
                }
                let Some(map) = node.as_object_mut() else {
                    return;
                };
                node = map
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            if let Some(map) = node.as_object_mut() {
                map.insert(last.clone(), value);
            }
        }
        None => remove(root, segments),
    }
}

fn remove(node: &mut Value, segments: &[String]) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    let Some(map) = node.as_object_mut() else {
        return;
    };
    if rest.is_empty() {
        map.remove(first);
        return;
    }
    if let Some(child) = map.get_mut(first) {
        remove(child, rest);
        if is_empty(child) {
            map.remove(first);
        }
    }
}

/// Drop nulls and empty objects recursively.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !is_empty(v))
                .collect(),
        ),
        other => other,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
