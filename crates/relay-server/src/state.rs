//! Process-wide shared state (§4.10 "Live config", §5 "Shared mutable
//! state"): one [`AppState`] per process, cloned cheaply into every
//! request via axum's `State` extractor.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use relay_config::{ConfigSnapshot, LiveConfig};
use relay_providers::proxy::ProviderProxy;
use relay_router::{PriorityWeightRouter, ProviderRouter, RoundRobinRouter};
use relay_thinking::{MemorySignatureCache, SignatureCache};

/// A live provider plus its router-candidate weighting, rebuilt whenever
/// the config reloads.
pub struct ProviderEntry {
    pub proxy: Arc<ProviderProxy>,
    pub weight: u32,
    pub priority: u32,
}

pub struct AppState {
    pub config: Arc<LiveConfig>,
    pub http_client: reqwest::Client,
    pub providers: ArcSwap<Vec<ProviderEntry>>,
    pub router: ArcSwap<Arc<dyn ProviderRouter>>,
    pub signature_cache: Arc<dyn SignatureCache>,
}

impl AppState {
    pub fn new(config: Arc<LiveConfig>) -> Self {
        let snapshot = config.load();
        let providers = build_provider_entries(&snapshot);
        let router = build_router(&snapshot.routing.strategy);
        let signature_cache: Arc<dyn SignatureCache> =
            Arc::new(MemorySignatureCache::new(Duration::from_secs(snapshot.cache.ttl_secs)));

        Self {
            config,
            http_client: build_http_client(),
            providers: ArcSwap::from_pointee(providers),
            router: ArcSwap::from_pointee(router),
            signature_cache,
        }
    }

    /// Rebuilds providers and the router strategy from the current config
    /// snapshot and swaps them in atomically. Called once at startup and
    /// again whenever [`LiveConfig`]'s watch channel fires (§4.10).
    pub fn refresh_from_config(&self) {
        let snapshot = self.config.load();
        self.providers.store(Arc::new(build_provider_entries(&snapshot)));
        self.router.store(Arc::new(build_router(&snapshot.routing.strategy)));
    }

    pub fn provider_entries(&self) -> Arc<Vec<ProviderEntry>> {
        self.providers.load_full()
    }

    pub fn router(&self) -> Arc<Arc<dyn ProviderRouter>> {
        self.router.load_full()
    }
}

/// Shared across every provider and every request. A 30s connect timeout
/// guards against a backend that never completes its TCP/TLS handshake; no
/// fixed total-response timeout, since a streaming SSE response may
/// legitimately stay open for the duration of a long generation (§5
/// `WriteTimeout` 600s is enforced separately, at the `axum` layer, via
/// `relay_server::request_timeout`).
fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

fn build_provider_entries(snapshot: &ConfigSnapshot) -> Vec<ProviderEntry> {
    snapshot
        .providers
        .iter()
        .map(|cfg| ProviderEntry {
            proxy: Arc::new(relay_providers::build_proxy(cfg)),
            weight: cfg.weight,
            priority: cfg.priority,
        })
        .collect()
}

fn build_router(strategy: &str) -> Arc<dyn ProviderRouter> {
    match strategy {
        "priority_weight" => Arc::new(PriorityWeightRouter::new()),
        _ => Arc::new(RoundRobinRouter::new()),
    }
}
