//! Canonical state serialization and digests

use serde_json::Value;
use sha2::{Digest, Sha256};

// =============================================================================
// Canonicalization
// =============================================================================

/// Serialize a JSON value with object keys sorted at every depth.
///
/// Output is compact JSON and independent of map insertion order, so two
/// logically equal states always produce the same bytes.
///
/// Keys are sorted here instead of relying on `serde_json::to_string`: with
/// the `preserve_order` feature, which any crate in the build can turn on,
/// `serde_json::Map` keeps insertion order and the digest would change.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => push_json_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_json_string(key, out);
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

fn push_json_string(s: &str, out: &mut String) {
    // Serializing a str cannot fail
    let escaped = serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s));
    out.push_str(&escaped);
}

// =============================================================================
// Digest Functions
// =============================================================================

/// SHA256 digest of the canonical form of `state`
///
/// Returns digest in format: `sha256:<hex>`
pub fn state_digest(state: &Value) -> String {
    let canonical = canonicalize(state);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

/// Check a state against a recorded digest
pub fn digest_matches(recorded_digest: &str, state: &Value) -> bool {
    state_digest(state) == recorded_digest
}

// =============================================================================
// Tests
// =============================================================================
