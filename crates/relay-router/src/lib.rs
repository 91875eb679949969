//! Provider router (§4.4 "Router (external)").
//!
//! Selection strategies implement `ProviderRouter` over a `ProviderInfo`
//! candidate slice that's already been filtered by model (relay-providers'
//! job) and health-annotated fresh for this call — a candidate's health is
//! never cached across calls.

mod filter;
mod priority_weight;
mod round_robin;

use std::sync::Arc;

use async_trait::async_trait;
use relay_core::Provider;

pub use filter::{filter_by_target, target_provider_name};
pub use priority_weight::PriorityWeightRouter;
pub use round_robin::RoundRobinRouter;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("no providers available")]
pub struct ErrNoProviders;

/// A routing candidate: a provider plus its health state and the
/// strategy-relevant weighting for this call, queried fresh by the caller
/// immediately before `select`.
#[derive(Clone)]
pub struct ProviderInfo {
    pub provider: Arc<dyn Provider>,
    pub is_healthy: bool,
    pub weight: u32,
    pub priority: u32,
}

impl ProviderInfo {
    pub fn healthy(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            is_healthy: true,
            weight: 1,
            priority: 0,
        }
    }
}

/// Stateless per call except for strategy-internal counters (e.g. a
/// round-robin cursor), per §4.4.
#[async_trait]
pub trait ProviderRouter: Send + Sync {
    async fn select(&self, candidates: &[ProviderInfo]) -> Result<ProviderInfo, ErrNoProviders>;

    /// Short name surfaced on `X-CC-Relay-Strategy` when routing debug is on.
    fn name(&self) -> &'static str;
}

fn healthy_candidates(candidates: &[ProviderInfo]) -> Vec<&ProviderInfo> {
    candidates.iter().filter(|c| c.is_healthy).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::error::RelayError;
    use relay_core::provider::{Provider, ProviderKind, TransformedRequest};
    use reqwest::header::HeaderMap;

    pub struct FakeProvider(pub &'static str);

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            self.0
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::AnthropicDirect
        }
        fn base_url(&self) -> &str {
            "https://example.invalid"
        }
        fn models(&self) -> &[String] {
            &[]
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
        fn authenticate(&self, _headers: &mut HeaderMap, _key_secret: &str) -> Result<(), RelayError> {
            Ok(())
        }
        fn forward_headers(&self) -> &[&str] {
            &[]
        }
        fn transform_request(&self, _body: &[u8], _path: &str) -> Result<TransformedRequest, RelayError> {
            unimplemented!()
        }
    }

    pub fn candidate(name: &'static str, healthy: bool) -> ProviderInfo {
        ProviderInfo {
            provider: Arc::new(FakeProvider(name)),
            is_healthy: healthy,
            weight: 1,
            priority: 0,
        }
    }

    #[tokio::test]
    async fn empty_candidates_is_no_providers() {
        let router = RoundRobinRouter::new();
        assert!(router.select(&[]).await.is_err());
    }

    #[tokio::test]
    async fn all_unhealthy_candidates_is_no_providers() {
        let router = RoundRobinRouter::new();
        let candidates = vec![candidate("a", false), candidate("b", false)];
        assert!(router.select(&candidates).await.is_err());
    }
}
