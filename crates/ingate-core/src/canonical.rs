//! Deterministic, key-sorted JSON encoding.
//!
//! The single source of truth for anything that must be signed or hashed:
//! two structurally equal values always produce byte-identical encodings,
//! regardless of the key order they were built or parsed with. Output is
//! compact JSON (no whitespace) with object keys in lexicographic order at
//! every nesting level.

use serde_json::Value;

/// Encodes a JSON value canonically.
///
/// Objects are emitted with keys sorted lexicographically; arrays keep their
/// order; scalars use `serde_json`'s standard formatting, so numbers and
/// string escapes match what a plain serialization would produce.
pub fn encode(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(&map[*key], out);
            }
            out.push('}');
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        },
        Value::String(s) => write_string(s, out),
        // Null, booleans and numbers have a single serde_json rendering.
        other => out.push_str(&other.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    // serde_json handles escaping; serializing a &str cannot fail.
    out.push_str(&serde_json::to_string(s).unwrap_or_default());
}
