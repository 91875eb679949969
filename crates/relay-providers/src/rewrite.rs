//! Model rewriter (§4.3): translate a client-facing model name to whatever
//! the selected provider calls it before forwarding, via a static mapping
//! table plus each provider's own [`relay_core::Provider::map_model`].
//! Degrades to the original body untouched on any parse failure.

use std::collections::BTreeMap;

use serde_json::Value;

/// `aliases` maps a client-facing model name to a provider-facing one,
/// independent of the per-provider prefix/suffix [`relay_core::Provider::map_model`]
/// applies. Checked first; `map_model` still runs on the result.
pub fn rewrite_model_field(body: &[u8], aliases: &BTreeMap<String, String>, map_model: impl Fn(&str) -> String) -> Vec<u8> {
    let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
        return body.to_vec();
    };
    let Some(model) = value.get("model").and_then(Value::as_str).map(str::to_string) else {
        return body.to_vec();
    };

    let aliased = aliases.get(&model).cloned().unwrap_or(model);
    let rewritten = map_model(&aliased);

    if let Some(obj) = value.as_object_mut() {
        obj.insert("model".to_string(), Value::String(rewritten));
    }

    serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec())
}
