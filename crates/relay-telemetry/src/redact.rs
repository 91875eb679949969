//! Redaction (§4.9, §10.1): strips secret-shaped fields out of a JSON value
//! before it's ever written to a log line, including the debug/metrics sink.

use serde_json::Value;

/// Field names treated as secrets regardless of case. `spec.md` §4.9 names
/// `api_key`, `password`, `authorization`; `x-api-key`, `secret`, and `token`
/// are the natural extension of that list for this wire protocol.
const REDACTED_FIELDS: &[&str] = &["api_key", "password", "authorization", "x-api-key", "secret", "token"];

const REDACTED_PLACEHOLDER: &str = "[redacted]";

/// Returns a copy of `value` with every object field whose name matches
/// (case-insensitively) an entry in [`REDACTED_FIELDS`] replaced by a fixed
/// placeholder, recursing into nested objects and arrays.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, v) in map {
                if is_redacted_field(key) {
                    out.insert(key.clone(), Value::String(REDACTED_PLACEHOLDER.to_string()));
                } else {
                    out.insert(key.clone(), redact(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

fn is_redacted_field(key: &str) -> bool {
    REDACTED_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(key))
}
