//! Per-request context bag (§3 "Request context").
//!
//! Carried through the middleware chain and handler via axum request
//! extensions. Fields are filled in as the pipeline progresses; nothing here
//! is ever shared across requests.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::ids::RequestId;

#[derive(Default)]
struct Inner {
    selected_key_id: Option<String>,
    model: Option<String>,
    thinking_affinity: bool,
    body_too_large: bool,
    provider_name: Option<String>,
    routing_strategy: Option<String>,
    client_addr: Option<String>,
}

/// Cheap to clone (an `Arc` around a mutex); every clone observes the same
/// underlying state for the lifetime of one request.
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub deadline: Instant,
    inner: Arc<Mutex<Inner>>,
}

impl RequestContext {
    pub fn new(request_id: RequestId, timeout: std::time::Duration) -> Self {
        Self {
            request_id,
            deadline: Instant::now() + timeout,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn set_model(&self, model: impl Into<String>) {
        self.inner.lock().model = Some(model.into());
    }

    pub fn model(&self) -> Option<String> {
        self.inner.lock().model.clone()
    }

    pub fn set_thinking_affinity(&self, v: bool) {
        self.inner.lock().thinking_affinity = v;
    }

    pub fn thinking_affinity(&self) -> bool {
        self.inner.lock().thinking_affinity
    }

    pub fn set_body_too_large(&self, v: bool) {
        self.inner.lock().body_too_large = v;
    }

    pub fn body_too_large(&self) -> bool {
        self.inner.lock().body_too_large
    }

    pub fn set_selected_key_id(&self, key_id: impl Into<String>) {
        self.inner.lock().selected_key_id = Some(key_id.into());
    }

    pub fn selected_key_id(&self) -> Option<String> {
        self.inner.lock().selected_key_id.clone()
    }

    pub fn set_provider_name(&self, name: impl Into<String>) {
        self.inner.lock().provider_name = Some(name.into());
    }

    pub fn provider_name(&self) -> Option<String> {
        self.inner.lock().provider_name.clone()
    }

    pub fn set_routing_strategy(&self, strategy: impl Into<String>) {
        self.inner.lock().routing_strategy = Some(strategy.into());
    }

    pub fn routing_strategy(&self) -> Option<String> {
        self.inner.lock().routing_strategy.clone()
    }

    /// The peer address `axum::serve`'s `ConnectInfo` observed for this
    /// connection, fed into `X-Forwarded-For` by the provider proxy (§4.6).
    pub fn set_client_addr(&self, addr: impl Into<String>) {
        self.inner.lock().client_addr = Some(addr.into());
    }

    pub fn client_addr(&self) -> Option<String> {
        self.inner.lock().client_addr.clone()
    }

    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ctx() -> RequestContext {
        RequestContext::new(RequestId::new(), Duration::from_secs(10))
    }

    #[test]
    fn fields_round_trip() {
        let ctx = ctx();
        ctx.set_model("claude-opus");
        ctx.set_thinking_affinity(true);
        ctx.set_body_too_large(true);
        ctx.set_selected_key_id("a1b2c3d4");
        ctx.set_provider_name("anthropic");
        ctx.set_routing_strategy("round_robin");

        assert_eq!(ctx.model().as_deref(), Some("claude-opus"));
        assert!(ctx.thinking_affinity());
        assert!(ctx.body_too_large());
        assert_eq!(ctx.selected_key_id().as_deref(), Some("a1b2c3d4"));
        assert_eq!(ctx.provider_name().as_deref(), Some("anthropic"));
        assert_eq!(ctx.routing_strategy().as_deref(), Some("round_robin"));
    }

    #[test]
    fn clones_share_state() {
        let ctx = ctx();
        let clone = ctx.clone();
        clone.set_model("claude-sonnet");
        assert_eq!(ctx.model().as_deref(), Some("claude-sonnet"));
    }

    #[test]
    fn unset_fields_default_absent() {
        let ctx = ctx();
        assert!(ctx.model().is_none());
        assert!(!ctx.thinking_affinity());
        assert!(!ctx.body_too_large());
    }

    #[test]
    fn deadline_not_yet_expired() {
        let ctx = ctx();
        assert!(!ctx.is_expired());
        assert!(ctx.remaining() > Duration::from_secs(0));
    }
}
