//! Direct Anthropic upstream: the wire format this proxy already speaks, so
//! no body transform is needed (§9 "Provider polymorphism").

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};

use relay_core::error::RelayError;
use relay_core::provider::{header_value, Provider, ProviderKind, TransformedRequest};

pub struct AnthropicProvider {
    name: String,
    base_url: String,
    models: Vec<String>,
}

impl AnthropicProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            models,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::AnthropicDirect
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
        true
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
        &[
            "anthropic-ratelimit-requests-remaining",
            "anthropic-ratelimit-tokens-remaining",
        ]
    }

    fn transform_request(&self, _body: &[u8], _original_path: &str) -> Result<TransformedRequest, RelayError> {
        Err(RelayError::InternalError(
            "anthropic provider never requires body transform".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_auth_supported_no_transform_needed() {
        let provider = AnthropicProvider::new("anthropic", "https://api.anthropic.com", vec![]);
        assert!(provider.supports_transparent_auth());
        assert!(!provider.requires_body_transform());
        assert_eq!(provider.streaming_content_type(), "text/event-stream");
    }

    #[test]
    fn authenticate_sets_api_key_and_version() {
        let provider = AnthropicProvider::new("anthropic", "https://api.anthropic.com", vec![]);
        let mut headers = HeaderMap::new();
        provider.authenticate(&mut headers, "sk-ant-test").unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "sk-ant-test");
        assert_eq!(headers.get("anthropic-version").unwrap(), "2023-06-01");
    }
}
