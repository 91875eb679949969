//! Model extraction (§4.3): pull the `model` field out of a request body
//! without disturbing it. Every caller that reads the body for this must
//! restore it afterward — this module never consumes the body, only borrows
//! it, so there's nothing to restore on this side of the boundary.

use serde_json::Value;

/// Returns `None` on anything that isn't a JSON object with a non-empty
/// string `model` field, rather than erroring — the handler falls back to
/// the default provider when extraction fails (§4.8 step 3, graceful
/// degradation).
pub fn extract_model(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let model = value.get("model")?.as_str()?;
    if model.is_empty() {
        None
    } else {
        Some(model.to_string())
    }
}

/// Like [`extract_model`] but also reports whether the request asked for a
/// streaming response, since both are read from the same parse (§4.8 step
/// 3 reads model and `stream` together).
pub fn extract_model_and_stream(body: &[u8]) -> (Option<String>, bool) {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return (None, false);
    };
    let model = value
        .get("model")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let stream = value.get("stream").and_then(Value::as_bool).unwrap_or(false);
    (model, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_model_from_well_formed_body() {
        let body = json!({ "model": "claude-opus-4", "messages": [] });
        assert_eq!(extract_model(body.to_string().as_bytes()), Some("claude-opus-4".to_string()));
    }

    #[test]
    fn missing_model_field_is_none() {
        let body = json!({ "messages": [] });
        assert_eq!(extract_model(body.to_string().as_bytes()), None);
    }

    #[test]
    fn empty_model_string_is_none() {
        let body = json!({ "model": "" });
        assert_eq!(extract_model(body.to_string().as_bytes()), None);
    }

    #[test]
    fn malformed_json_is_none_not_a_panic() {
        assert_eq!(extract_model(b"not json"), None);
    }

    #[test]
    fn extracts_stream_flag_alongside_model() {
        let body = json!({ "model": "claude-opus-4", "stream": true });
        let (model, stream) = extract_model_and_stream(body.to_string().as_bytes());
        assert_eq!(model, Some("claude-opus-4".to_string()));
        assert!(stream);
    }

    #[test]
    fn missing_stream_defaults_to_false() {
        let body = json!({ "model": "claude-opus-4" });
        let (_, stream) = extract_model_and_stream(body.to_string().as_bytes());
        assert!(!stream);
    }
}
