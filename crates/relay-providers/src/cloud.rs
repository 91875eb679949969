//! Cloud-transform upstream: a Bedrock-shaped backend whose invoke URL
//! embeds the model id and whose streaming responses arrive as the binary
//! Event-Stream framing `relay-sse::eventstream` transcodes (§4.6, §4.7).

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;

use relay_core::error::RelayError;
use relay_core::provider::{header_value, Provider, ProviderKind, TransformedRequest};

pub struct CloudTransformProvider {
    name: String,
    base_url: String,
    models: Vec<String>,
    model_prefix: String,
}

impl CloudTransformProvider {
    /// `model_prefix` is prepended to the client-facing model name to form
    /// the provider's own model id (e.g. a region/profile prefix Bedrock
    /// cross-region inference profiles require).
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        models: Vec<String>,
        model_prefix: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            models,
            model_prefix: model_prefix.into(),
        }
    }

    fn invoke_path(&self, model_id: &str, streaming: bool) -> String {
        let suffix = if streaming {
            "invoke-with-response-stream"
        } else {
            "invoke"
        };
        format!(
            "{}/model/{}/{}",
            self.base_url.trim_end_matches('/'),
            urlencode_path_segment(model_id),
            suffix
        )
    }
}

/// Percent-encodes the characters Bedrock-style model ids commonly contain
/// (`.` and `:`) that would otherwise split the URL path.
fn urlencode_path_segment(s: &str) -> String {
    s.replace('.', "%2E").replace(':', "%3A")
}

#[async_trait]
impl Provider for CloudTransformProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::CloudTransform
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    fn streaming_content_type(&self) -> &str {
        "application/vnd.amazon.eventstream"
    }

    fn supports_transparent_auth(&self) -> bool {
        false
    }

    fn requires_body_transform(&self) -> bool {
        true
    }

    fn authenticate(&self, headers: &mut HeaderMap, key_secret: &str) -> Result<(), RelayError> {
        headers.insert("authorization", header_value(&format!("Bearer {key_secret}"))?);
        Ok(())
    }

    fn forward_headers(&self) -> &[&str] {
        &[]
    }

    fn transform_request(&self, body: &[u8], _original_path: &str) -> Result<TransformedRequest, RelayError> {
        let mut parsed: Value =
            serde_json::from_slice(body).map_err(|e| RelayError::MalformedRequest(e.to_string()))?;

        let model = parsed
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::MalformedRequest("missing model field".to_string()))?
            .to_string();
        let model_id = self.map_model(&model);

        let streaming = parsed.get("stream").and_then(Value::as_bool).unwrap_or(false);

        if let Some(obj) = parsed.as_object_mut() {
            obj.remove("model");
            obj.remove("stream");
            obj.entry("anthropic_version")
                .or_insert_with(|| Value::String("bedrock-2023-05-31".to_string()));
        }

        let out = serde_json::to_vec(&parsed).map_err(|e| RelayError::MalformedRequest(e.to_string()))?;
        Ok(TransformedRequest {
            body: out,
            target_url: self.invoke_path(&model_id, streaming),
        })
    }

    fn map_model(&self, model: &str) -> String {
        format!("{}{}", self.model_prefix, model)
    }
}
