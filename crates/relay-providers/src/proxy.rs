//! Provider proxy (§4.6): the per-provider reverse proxy. One instance is
//! built per configured provider at config-load time and reused across
//! requests; it owns that provider's key pool and decides, per request,
//! whether to forward the client's own credentials or draw one from the
//! pool, whether the body needs a transform, and where to send it.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;

use relay_core::error::RelayError;
use relay_core::provider::Provider;

use crate::keypool::KeyPool;

/// Headers stripped from the inbound request before forwarding: hop-by-hop
/// headers that don't survive a proxy hop, plus the client's own auth
/// (re-added explicitly once the auth decision is made) and the internal
/// selected-key marker, which must never reach an upstream (§9 "internal
/// header hygiene").
const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "x-selected-key",
    "authorization",
    "x-api-key",
];

pub struct ForwardOutcome {
    pub response: reqwest::Response,
    /// The key id used, if any was drawn from the pool (never surfaced to
    /// the client; carried for logging via [`relay_core::RequestContext`]).
    pub key_id: Option<String>,
}

pub struct ProviderProxy {
    provider: Arc<dyn Provider>,
    key_pool: Arc<dyn KeyPool>,
}

impl ProviderProxy {
    pub fn new(provider: Arc<dyn Provider>, key_pool: Arc<dyn KeyPool>) -> Self {
        Self { provider, key_pool }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn key_pool(&self) -> &Arc<dyn KeyPool> {
        &self.key_pool
    }

    /// Health for router candidacy (§3 "Provider info (router candidate)"):
    /// a provider with no keys configured (needs none) or at least one
    /// usable key is healthy; transparent-auth providers are always
    /// healthy since they don't depend on the pool for client-authed
    /// requests.
    pub fn is_healthy(&self) -> bool {
        self.provider.supports_transparent_auth() || self.key_pool.is_empty() || self.key_pool.has_usable_key()
    }

    fn copy_passthrough_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        let mut out = HeaderMap::new();
        for (name, value) in inbound {
            if STRIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
                continue;
            }
            out.insert(name.clone(), value.clone());
        }
        out
    }

    /// §4.6(a): the request-rewrite step. A body-transforming provider's
    /// `transform_request` failure falls back to the static target with the
    /// original body rather than surfacing an error — the same
    /// graceful-degradation discipline the rewrite components use (§7).
    fn resolve_request(&self, body: Bytes, original_path: &str) -> (Bytes, String) {
        let static_target = format!("{}{}", self.provider.base_url().trim_end_matches('/'), original_path);

        if !self.provider.requires_body_transform() {
            return (body, static_target);
        }

        match self.provider.transform_request(&body, original_path) {
            Ok(transformed) => (Bytes::from(transformed.body), transformed.target_url),
            Err(err) => {
                tracing::warn!(
                    provider = %self.provider.name(),
                    error = %err,
                    "body transform failed, forwarding original body to static target"
                );
                (body, static_target)
            }
        }
    }

    /// Forwards one request. `client_auth` is the client's own
    /// `Authorization`/`x-api-key` header value, if present and the auth
    /// middleware decided it may be used transparently for this provider.
    /// `client_addr` is the peer address `axum::serve`'s `ConnectInfo`
    /// observed for this connection, if any (§4.6 "set `X-Forwarded-*`").
    pub async fn forward(
        &self,
        client: &reqwest::Client,
        method: Method,
        original_path: &str,
        inbound_headers: &HeaderMap,
        body: Bytes,
        client_auth: Option<&str>,
        client_addr: Option<&str>,
    ) -> Result<ForwardOutcome, RelayError> {
        let mut headers = self.copy_passthrough_headers(inbound_headers);
        apply_forwarded_headers(&mut headers, inbound_headers, client_addr);

        let (outgoing_body, target_url) = self.resolve_request(body, original_path);

        let key_id: Option<String> = if self.provider.supports_transparent_auth() && client_auth.is_some() {
            if let Some(auth) = client_auth {
                apply_client_auth(&mut headers, auth)?;
            }
            None
        } else if self.key_pool.is_empty() {
            // No keys were ever configured for this provider: a config
            // problem, not a transient rate-limit condition.
            return Err(RelayError::InternalError(format!(
                "provider {} has no configured keys",
                self.provider.name()
            )));
        } else {
            let pool_key = self.key_pool.acquire().await.ok_or_else(|| {
                let retry_after = self
                    .key_pool
                    .earliest_reset()
                    .unwrap_or(std::time::Duration::from_secs(1))
                    .max(std::time::Duration::from_secs(1));
                RelayError::RateLimit { retry_after }
            })?;
            self.provider.authenticate(&mut headers, &pool_key.secret)?;
            pool_key.record_request();
            Some(pool_key.key_id.clone())
        };

        let response = client
            .request(method, &target_url)
            .headers(headers)
            .body(outgoing_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout
                } else {
                    RelayError::UpstreamUnavailable(e.to_string())
                }
            })?;

        Ok(ForwardOutcome { response, key_id })
    }
}

/// §4.6 "set `X-Forwarded-*`": appends to any value the client already
/// presented (trusted only insofar as this proxy's own deployment trusts
/// its inbound edge) and fills in `Host`/`Proto` from the inbound request.
fn apply_forwarded_headers(out: &mut HeaderMap, inbound: &HeaderMap, client_addr: Option<&str>) {
    if let Some(addr) = client_addr {
        let value = match inbound.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.is_empty() => format!("{existing}, {addr}"),
            _ => addr.to_string(),
        };
        if let Ok(v) = HeaderValue::from_str(&value) {
            out.insert(HeaderName::from_static("x-forwarded-for"), v);
        }
    }

    if let Some(host) = inbound.get(reqwest::header::HOST) {
        out.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
    }

    let proto = inbound
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    if let Ok(v) = HeaderValue::from_str(proto) {
        out.insert(HeaderName::from_static("x-forwarded-proto"), v);
    }
}

fn apply_client_auth(headers: &mut HeaderMap, auth: &str) -> Result<(), RelayError> {
    let name = HeaderName::from_static("x-api-key");
    let value = HeaderValue::from_str(auth).map_err(|e| RelayError::InternalError(e.to_string()))?;
    headers.insert(name, value);
    Ok(())
}
