//! Thinking-block rewriting (§4.2).
//!
//! Makes a multi-turn request with historical thinking blocks acceptable to
//! the selected upstream, and re-signs/caches provider-issued signatures on
//! the way back.

use std::sync::Arc;

use serde_json::Value;

use crate::cache::{is_valid_signature, SignatureCache};
use crate::group::model_group;
use crate::prefixed::{format_prefixed, parse_prefixed};

/// Cheap byte-level pre-check gating the (relatively expensive) structured
/// rewrite. Fires only when all three substrings are present, matching the
/// the literal detector from the source system rather than a single
/// "thinking" check, so a response that merely mentions the word in prose
/// text doesn't trigger a parse.
pub fn fast_detect(body: &[u8]) -> bool {
    contains(body, b"\"type\":\"thinking\"") && contains(body, b"signature") && contains(body, b"thinking")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len().max(1)).any(|w| w == needle)
}

/// Inferred per Open Question #2: the fast detector plus an assistant-role
/// check — true iff some assistant message carries a thinking block with a
/// non-empty `signature` field already set.
pub fn has_thinking_signature(body: &Value) -> bool {
    let Some(messages) = body.get("messages").and_then(Value::as_array) else {
        return false;
    };
    messages.iter().any(|m| {
        m.get("role").and_then(Value::as_str) == Some("assistant")
            && m.get("content")
                .and_then(Value::as_array)
                .map(|blocks| {
                    blocks.iter().any(|b| {
                        b.get("type").and_then(Value::as_str) == Some("thinking")
                            && b.get("signature")
                                .and_then(Value::as_str)
                                .is_some_and(|s| !s.is_empty())
                    })
                })
                .unwrap_or(false)
    })
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStats {
    pub dropped_blocks: usize,
}

/// Rewrite a request body so every surviving thinking block carries a raw
/// (unprefixed) signature the upstream will accept, tool-use blocks never
/// carry a `signature` field, and turn alternation is preserved even when a
/// whole assistant message's content is dropped.
///
/// Falls back to the original body unchanged on any parse failure —
/// `MalformedRequest` is never surfaced for this path (§7).
pub async fn rewrite_request(
    body: &[u8],
    model: &str,
    cache: &Arc<dyn SignatureCache>,
) -> (Vec<u8>, RewriteStats) {
    let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
        return (body.to_vec(), RewriteStats::default());
    };

    let mut stats = RewriteStats::default();

    let Some(messages) = value.get_mut("messages").and_then(Value::as_array_mut) else {
        return (body.to_vec(), stats);
    };

    for message in messages.iter_mut() {
        if message.get("role").and_then(Value::as_str) != Some("assistant") {
            continue;
        }
        let Some(content) = message.get_mut("content").and_then(Value::as_array_mut) else {
            continue;
        };

        rewrite_assistant_content(content, model, cache, &mut stats).await;
        message["content"] = Value::Array(std::mem::take(content));
    }

    match serde_json::to_vec(&value) {
        Ok(bytes) => (bytes, stats),
        Err(_) => (body.to_vec(), RewriteStats::default()),
    }
}

async fn rewrite_assistant_content(
    content: &mut Vec<Value>,
    model: &str,
    cache: &Arc<dyn SignatureCache>,
    stats: &mut RewriteStats,
) {
    // First pass: resolve signatures / strip tool_use signatures, marking
    // thinking blocks that must be dropped. Sequential awaits keep this
    // simple; cache lookups are expected to be fast and non-blocking.
    let mut keep = Vec::with_capacity(content.len());
    let mut any_dropped = false;

    for block in content.iter_mut() {
        match block.get("type").and_then(Value::as_str) {
            Some("thinking") => match resolve_signature(block, model, cache).await {
                Some(sig) => {
                    block["signature"] = Value::String(sig);
                    keep.push(true);
                }
                None => {
                    stats.dropped_blocks += 1;
                    any_dropped = true;
                    keep.push(false);
                }
            },
            Some("tool_use") => {
                if let Some(obj) = block.as_object_mut() {
                    obj.remove("signature");
                }
                keep.push(true);
            }
            _ => keep.push(true),
        }
    }

    let thinking_remains = content
        .iter()
        .zip(&keep)
        .any(|(b, k)| *k && b.get("type").and_then(Value::as_str) == Some("thinking"));

    let needs_reorder = thinking_remains && needs_reordering(content, &keep);

    if !any_dropped && !needs_reorder {
        // Surgical path: no structural change, in-place field edits above
        // already applied; array membership and order are untouched.
        return;
    }

    let mut surviving: Vec<Value> = content
        .drain(..)
        .zip(keep)
        .filter_map(|(b, k)| k.then_some(b))
        .collect();

    if needs_reorder {
        let (mut thinking, mut rest) = (Vec::new(), Vec::new());
        for block in surviving.drain(..) {
            if block.get("type").and_then(Value::as_str) == Some("thinking") {
                thinking.push(block);
            } else {
                rest.push(block);
            }
        }
        thinking.append(&mut rest);
        surviving = thinking;
    }

    if surviving.is_empty() {
        // Empty-message policy: placeholder preserves turn alternation
        // instead of removing the message entirely (§4.2, Open Question #1).
        surviving.push(serde_json::json!({"type": "text", "text": ""}));
    }

    *content = surviving;
}

fn needs_reordering(content: &[Value], keep: &[bool]) -> bool {
    let mut seen_non_thinking = false;
    for (block, k) in content.iter().zip(keep) {
        if !*k {
            continue;
        }
        let is_thinking = block.get("type").and_then(Value::as_str) == Some("thinking");
        if is_thinking && seen_non_thinking {
            return true;
        }
        if !is_thinking {
            seen_non_thinking = true;
        }
    }
    false
}

async fn resolve_signature(block: &Value, model: &str, cache: &Arc<dyn SignatureCache>) -> Option<String> {
    let signature = block.get("signature").and_then(Value::as_str).unwrap_or("");
    if !signature.is_empty() {
        if let Some((_, raw)) = parse_prefixed(signature) {
            return Some(raw);
        }
        if is_valid_signature(model, signature) {
            return Some(signature.to_string());
        }
    }

    let text = block.get("thinking").and_then(Value::as_str).unwrap_or("");
    cache.get(model, text).await
}

/// Non-streaming response rewrite (§4.2 "Response signature handling").
/// Caches every `(text, raw-signature)` pair found and rewrites the
/// outbound signature to prefixed form.
pub async fn rewrite_response(body: &[u8], model: &str, cache: &Arc<dyn SignatureCache>) -> Vec<u8> {
    let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
        return body.to_vec();
    };

    let Some(content) = value.get_mut("content").and_then(Value::as_array_mut) else {
        return body.to_vec();
    };

    let group = model_group(model);
    for block in content.iter_mut() {
        if block.get("type").and_then(Value::as_str) != Some("thinking") {
            continue;
        }
        let text = block.get("thinking").and_then(Value::as_str).unwrap_or("").to_string();
        let Some(raw_sig) = block.get("signature").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        cache.set(model, &text, raw_sig.clone()).await;
        block["signature"] = Value::String(format_prefixed(&group, &raw_sig));
    }

    serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec())
}

/// Streaming signature processor (§4.2): accumulates `thinking_delta` text
/// and on each `signature_delta` caches the pair, resets, and rewrites the
/// outgoing signature to prefixed form.
pub struct SseSignatureProcessor {
    model: String,
    group: String,
    cache: Arc<dyn SignatureCache>,
    accumulated: String,
}

impl SseSignatureProcessor {
    pub fn new(model: impl Into<String>, cache: Arc<dyn SignatureCache>) -> Self {
        let model = model.into();
        let group = model_group(&model);
        Self {
            model,
            group,
            cache,
            accumulated: String::new(),
        }
    }

    /// Mutates a parsed `content_block_delta` event's data payload in
    /// place. No-op for any other event shape.
    pub async fn process(&mut self, data: &mut Value) {
        let Some(delta) = data.get_mut("delta") else {
            return;
        };
        match delta.get("type").and_then(Value::as_str) {
            Some("thinking_delta") => {
                if let Some(text) = delta.get("thinking").and_then(Value::as_str) {
                    self.accumulated.push_str(text);
                }
            }
            Some("signature_delta") => {
                let Some(raw_sig) = delta.get("signature").and_then(Value::as_str).map(str::to_string) else {
                    return;
                };
                self.cache.set(&self.model, &self.accumulated, raw_sig.clone()).await;
                self.accumulated.clear();
                delta["signature"] = Value::String(format_prefixed(&self.group, &raw_sig));
            }
            _ => {}
        }
    }
}
