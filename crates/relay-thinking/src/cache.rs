//! Signature cache contract and in-process reference backend (§4.1).
//!
//! The real backend is an external collaborator (§1 "the distributed cache
//! backend" is out of scope); this crate defines the contract every caller
//! programs against and ships an in-memory implementation for tests and
//! single-process deployments.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::group::model_group;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3 * 60 * 60);
const GEMINI_SENTINEL: &str = "skip_thought_signature_validator";

/// A signature is valid iff it's long enough to plausibly be
/// provider-issued, or it's the Gemini-only sentinel on a Gemini-family
/// model (§3 "Thinking block (wire)").
pub fn is_valid_signature(model: &str, signature: &str) -> bool {
    signature.len() >= 50 || (signature == GEMINI_SENTINEL && model_group(model) == "gemini")
}

/// `"sig:" + model-group + ":" + first-16-hex of SHA-256(thinking-text)`.
pub fn cache_key(model: &str, text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("sig:{}:{}", model_group(model), hex)
}

#[async_trait]
pub trait SignatureCache: Send + Sync {
    /// Non-blocking; returns `None` on miss or any backend error.
    async fn get(&self, model: &str, text: &str) -> Option<String>;

    /// Best-effort; silently discards entries that fail `is_valid_signature`.
    async fn set(&self, model: &str, text: &str, signature: String);
}

/// Accepted everywhere a cache is optional — every call is a no-op.
pub struct NoopCache;

#[async_trait]
impl SignatureCache for NoopCache {
    async fn get(&self, _model: &str, _text: &str) -> Option<String> {
        None
    }

    async fn set(&self, _model: &str, _text: &str, _signature: String) {}
}

struct Entry {
    signature: String,
    expires_at: Instant,
}

/// In-process reference implementation: a concurrent map keyed by
/// `cache_key`, with lazy TTL expiry checked on read.
pub struct MemorySignatureCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl MemorySignatureCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn with_default_ttl() -> Arc<Self> {
        Arc::new(Self::new(DEFAULT_TTL))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SignatureCache for MemorySignatureCache {
    async fn get(&self, model: &str, text: &str) -> Option<String> {
        let key = cache_key(model, text);
        let entry = self.entries.get(&key)?;
        if Instant::now() >= entry.expires_at {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(entry.signature.clone())
    }

    async fn set(&self, model: &str, text: &str, signature: String) {
        if !is_valid_signature(model, &signature) {
            return;
        }
        let key = cache_key(model, text);
        self.entries.insert(
            key,
            Entry {
                signature,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}
