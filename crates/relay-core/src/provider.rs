use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::RelayError;

/// An upstream's owner/type tag, used for `/v1/providers` and `/v1/models`
/// responses and for model-group-adjacent bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    AnthropicDirect,
    ZAi,
    Ollama,
    CloudTransform,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnthropicDirect => "anthropic",
            Self::ZAi => "zai",
            Self::Ollama => "ollama",
            Self::CloudTransform => "cloud",
        }
    }
}

/// The outcome of `transform_request` for providers whose wire format
/// diverges from Anthropic's (cloud providers whose URL path embeds the
/// model name, for instance).
pub struct TransformedRequest {
    pub body: Vec<u8>,
    pub target_url: String,
}

/// Provider polymorphism over a capability set, per the design note that a
/// tagged interface table is preferred over deep inheritance: every upstream
/// variant (direct Anthropic, Z.AI, Ollama, a cloud-transform backend)
/// implements the same trait rather than subclassing a common base.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique within the process; used as the routing target and in
    /// `/v1/providers` output.
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Base URL requests are forwarded to when no body transform applies.
    fn base_url(&self) -> &str;

    /// Model names this provider advertises (for `/v1/models`).
    fn models(&self) -> &[String];

    /// Content-Type this provider's streaming responses arrive as. Usually
    /// `text/event-stream`; cloud providers may emit a vendor Event-Stream
    /// content type that the provider proxy must detect and transcode.
    fn streaming_content_type(&self) -> &str;

    /// Whether this provider accepts the client's own `Authorization`/
    /// `x-api-key` header verbatim (transparent auth), bypassing the key
    /// pool for requests where the client supplied credentials.
    fn supports_transparent_auth(&self) -> bool;

    /// Whether requests to this provider require a body transform (the
    /// outgoing URL is computed by `transform_request`, not by joining the
    /// base URL with the inbound path).
    fn requires_body_transform(&self) -> bool;

    /// Inject authentication into the outgoing request headers using the
    /// selected pool key's secret.
    fn authenticate(&self, headers: &mut HeaderMap, key_secret: &str) -> Result<(), RelayError>;

    /// Headers from the provider's own response that should be copied back
    /// to the client verbatim (beyond the ones the proxy always forwards).
    fn forward_headers(&self) -> &[&str];

    /// Rewrite a request body destined for a provider whose wire format
    /// needs model-in-path URL construction. Only called when
    /// `requires_body_transform()` is true.
    fn transform_request(
        &self,
        body: &[u8],
        original_path: &str,
    ) -> Result<TransformedRequest, RelayError>;

    /// Map a client-facing model name to this provider's own naming, if it
    /// differs (cloud providers often prefix or suffix a region/version).
    fn map_model(&self, model: &str) -> String {
        model.to_string()
    }
}

pub fn header_value(s: &str) -> Result<HeaderValue, RelayError> {
    HeaderValue::from_str(s).map_err(|e| RelayError::InternalError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_as_str() {
        assert_eq!(ProviderKind::AnthropicDirect.as_str(), "anthropic");
        assert_eq!(ProviderKind::ZAi.as_str(), "zai");
        assert_eq!(ProviderKind::Ollama.as_str(), "ollama");
        assert_eq!(ProviderKind::CloudTransform.as_str(), "cloud");
    }

    #[test]
    fn provider_kind_serde_roundtrip() {
        for kind in [
            ProviderKind::AnthropicDirect,
            ProviderKind::ZAi,
            ProviderKind::Ollama,
            ProviderKind::CloudTransform,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            let parsed: ProviderKind = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, kind);
        }
    }
}
