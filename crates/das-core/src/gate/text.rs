//! Artifact text helpers shared by text-oriented gates.

use serde_json::Value;

/// Concatenate every string leaf of `artifact` (object values, array items)
/// in map-iteration order, one per line. Keys are not included.
pub fn flatten_text(artifact: &Value) -> String {
    let mut parts = Vec::new();
    collect(artifact, &mut parts);
    parts.join("\n")
}

fn collect<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect(v, out)),
        _ => {}
    }
}
