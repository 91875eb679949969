//! Local Ollama upstream: no auth at all, and a body transform from the
//! Anthropic Messages shape to Ollama's native `/api/chat` shape, since
//! Ollama has no notion of content blocks or a `system` top-level field.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{json, Value};

use relay_core::error::RelayError;
use relay_core::provider::{Provider, ProviderKind, TransformedRequest};

pub struct OllamaProvider {
    name: String,
    base_url: String,
    models: Vec<String>,
}

impl OllamaProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            models,
        }
    }
}

/// Flattens an Anthropic `content` field (a string, or an array of content
/// blocks) down to the plain string Ollama's chat API expects.
fn flatten_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn build_ollama_body(anthropic_body: &Value) -> Value {
    let mut messages = Vec::new();

    if let Some(system) = anthropic_body.get("system") {
        let text = match system {
            Value::String(s) => s.clone(),
            Value::Array(_) => flatten_content(system),
            _ => String::new(),
        };
        if !text.is_empty() {
            messages.push(json!({ "role": "system", "content": text }));
        }
    }

    if let Some(Value::Array(msgs)) = anthropic_body.get("messages") {
        for m in msgs {
            let role = m.get("role").and_then(Value::as_str).unwrap_or("user");
            let content = m.get("content").map(flatten_content).unwrap_or_default();
            messages.push(json!({ "role": role, "content": content }));
        }
    }

    json!({
        "model": anthropic_body.get("model").cloned().unwrap_or(Value::Null),
        "messages": messages,
        "stream": anthropic_body.get("stream").cloned().unwrap_or(Value::Bool(false)),
    })
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    fn streaming_content_type(&self) -> &str {
        "application/x-ndjson"
    }

    fn supports_transparent_auth(&self) -> bool {
        false
    }

    fn requires_body_transform(&self) -> bool {
        true
    }

    fn authenticate(&self, _headers: &mut HeaderMap, _key_secret: &str) -> Result<(), RelayError> {
        Ok(())
    }

    fn forward_headers(&self) -> &[&str] {
        &[]
    }

    fn transform_request(&self, body: &[u8], _original_path: &str) -> Result<TransformedRequest, RelayError> {
        let parsed: Value = serde_json::from_slice(body)
            .map_err(|e| RelayError::MalformedRequest(e.to_string()))?;
        let transformed = build_ollama_body(&parsed);
        let out =
            serde_json::to_vec(&transformed).map_err(|e| RelayError::MalformedRequest(e.to_string()))?;
        Ok(TransformedRequest {
            body: out,
            target_url: format!("{}/api/chat", self.base_url.trim_end_matches('/')),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_content_blocks_to_plain_text() {
        let blocks = json!([{ "type": "text", "text": "hello" }, { "type": "text", "text": "world" }]);
        assert_eq!(flatten_content(&blocks), "hello\nworld");
    }

    #[test]
    fn transform_builds_ollama_chat_shape() {
        let provider = OllamaProvider::new("ollama", "http://localhost:11434", vec![]);
        let body = json!({
            "model": "llama3",
            "system": "be terse",
            "messages": [{ "role": "user", "content": "hi" }],
            "stream": true,
        });
        let out = provider
            .transform_request(body.to_string().as_bytes(), "/v1/messages")
            .unwrap();
        assert_eq!(out.target_url, "http://localhost:11434/api/chat");

        let parsed: Value = serde_json::from_slice(&out.body).unwrap();
        assert_eq!(parsed["model"], "llama3");
        assert_eq!(parsed["stream"], true);
        assert_eq!(parsed["messages"][0]["role"], "system");
        assert_eq!(parsed["messages"][0]["content"], "be terse");
        assert_eq!(parsed["messages"][1]["role"], "user");
        assert_eq!(parsed["messages"][1]["content"], "hi");
    }

    #[test]
    fn malformed_body_is_a_typed_error_not_a_panic() {
        let provider = OllamaProvider::new("ollama", "http://localhost:11434", vec![]);
        assert!(provider.transform_request(b"not json", "/v1/messages").is_err());
    }
}
