//! Provider-facing pieces of the relay: model extraction/rewriting, the
//! longest-prefix provider filter's building blocks, concrete upstream
//! adapters, the key pool, and the per-provider reverse proxy (§4.3-§4.6).

pub mod anthropic;
pub mod cloud;
pub mod extractor;
pub mod keypool;
pub mod ollama;
pub mod proxy;
pub mod rewrite;
pub mod zai;

use std::sync::Arc;

use relay_config::{ProviderConfig, ProviderKindConfig};
use relay_core::provider::Provider;

use crate::anthropic::AnthropicProvider;
use crate::cloud::CloudTransformProvider;
use crate::keypool::InMemoryKeyPool;
use crate::ollama::OllamaProvider;
use crate::proxy::ProviderProxy;
use crate::zai::ZAiProvider;

pub use extractor::{extract_model, extract_model_and_stream};
pub use keypool::{InMemoryKeyPool as KeyPoolImpl, KeyPool, PoolKey};
pub use proxy::{ForwardOutcome, ProviderProxy as Proxy};
pub use rewrite::rewrite_model_field;

/// Builds the concrete [`Provider`] for one entry of the config's
/// `[[providers]]` table. Bedrock-style cloud providers read their model
/// prefix from the first configured model alias; callers that don't use
/// cloud providers can ignore that detail.
pub fn build_provider(cfg: &ProviderConfig) -> Arc<dyn Provider> {
    match cfg.kind {
        ProviderKindConfig::Anthropic => Arc::new(AnthropicProvider::new(
            cfg.name.clone(),
            cfg.base_url.clone(),
            cfg.models.clone(),
        )),
        ProviderKindConfig::Zai => Arc::new(ZAiProvider::new(
            cfg.name.clone(),
            cfg.base_url.clone(),
            cfg.models.clone(),
        )),
        ProviderKindConfig::Ollama => Arc::new(OllamaProvider::new(
            cfg.name.clone(),
            cfg.base_url.clone(),
            cfg.models.clone(),
        )),
        ProviderKindConfig::Cloud => Arc::new(CloudTransformProvider::new(
            cfg.name.clone(),
            cfg.base_url.clone(),
            cfg.models.clone(),
            cfg.model_prefix.clone(),
        )),
    }
}

/// Builds the provider's proxy, wiring together its concrete adapter and an
/// in-memory key pool seeded from its `[[providers.keys]]` entries.
pub fn build_proxy(cfg: &ProviderConfig) -> ProviderProxy {
    let provider = build_provider(cfg);
    let key_pool: Arc<dyn KeyPool> = Arc::new(InMemoryKeyPool::new(&cfg.keys));
    ProviderProxy::new(provider, key_pool)
}
