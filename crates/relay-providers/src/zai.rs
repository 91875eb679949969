//! Z.AI (GLM) upstream: speaks an Anthropic-compatible `/v1/messages` surface
//! (§9 "Provider polymorphism"), so like direct Anthropic it needs no body
//! transform, but it doesn't accept a client's own Anthropic credentials
//! transparently — the pool always supplies the key.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};

use relay_core::error::RelayError;
use relay_core::provider::{header_value, Provider, ProviderKind, TransformedRequest};

pub struct ZAiProvider {
    name: String,
    base_url: String,
    models: Vec<String>,
}

impl ZAiProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            models,
        }
    }
}

#[async_trait]
impl Provider for ZAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::ZAi
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    fn streaming_content_type(&self) -> &str {
        "text/event-stream"
    }

    fn supports_transparent_auth(&self) -> bool {
        false
    }

    fn requires_body_transform(&self) -> bool {
        false
    }

    fn authenticate(&self, headers: &mut HeaderMap, key_secret: &str) -> Result<(), RelayError> {
        headers.insert("x-api-key", header_value(key_secret)?);
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        Ok(())
    }

    fn forward_headers(&self) -> &[&str] {
        &[]
    }

    fn transform_request(&self, _body: &[u8], _original_path: &str) -> Result<TransformedRequest, RelayError> {
        Err(RelayError::InternalError(
            "zai provider never requires body transform".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_pool_key_not_transparent_auth() {
        let provider = ZAiProvider::new("zai", "https://api.z.ai/api/anthropic", vec![]);
        assert!(!provider.supports_transparent_auth());
        assert!(!provider.requires_body_transform());
    }
}
