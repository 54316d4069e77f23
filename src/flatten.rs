//! JSON flattening collaborator
//!
//! Converts an arbitrary JSON value into `(leaf path, primitive)` pairs, the
//! path being the colon-joined chain of object keys and decimal array
//! indices leading to each leaf. The store engine uses this whenever a
//! composite value is written, expanding it into a child store one leaf at a
//! time. Any implementation producing the same leaf set would be
//! substitutable; the engine depends only on this signature.

use serde_json::Value;

use crate::path;

/// Flatten a JSON value into ordered `(path, primitive)` leaf pairs
///
/// Object keys and array indices become path segments in document order;
/// array indices are 0-based decimal strings. Empty objects and arrays
/// contribute no pairs. A bare primitive at the root yields a single pair
/// with an empty path (callers in this crate only flatten composites).
///
/// # Examples
/// ```
/// use gatestore::flatten;
/// use serde_json::json;
///
/// let leaves = flatten(&json!({"b": 1, "c": [2, 3]}));
/// assert_eq!(leaves, vec![
///     ("b".to_string(), json!(1)),
///     ("c:0".to_string(), json!(2)),
///     ("c:1".to_string(), json!(3)),
/// ]);
/// ```
pub fn flatten(value: &Value) -> Vec<(String, Value)> {
    let mut leaves = Vec::new();
    let mut trail = Vec::new();
    walk(value, &mut trail, &mut leaves);
    leaves
}

fn walk(value: &Value, trail: &mut Vec<String>, leaves: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                trail.push(key.clone());
                walk(child, trail, leaves);
                trail.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                trail.push(index.to_string());
                walk(child, trail, leaves);
                trail.pop();
            }
        }
        primitive => {
            let path = path::join(trail.iter().map(String::as_str));
            leaves.push((path, primitive.clone()));
        }
    }
}
