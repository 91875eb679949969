//! Middleware chain (§4.9), applied in this order around the handler:
//! request-id, live auth, body-size limit, concurrency limit, logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use std::net::SocketAddr;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Semaphore;

use relay_core::error::RelayError;
use relay_core::ids::RequestId;
use relay_core::context::RequestContext;
use relay_core::security::secure_compare;
use relay_telemetry::{record_status, request_span};
use tracing::Instrument;

use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stamps a [`RequestContext`] into the request's extensions: the inbound
/// `X-Request-ID` if present, else a fresh one. Echoed back on the
/// response (§4.9 "Request-ID"). Opens the per-request tracing span every
/// later layer and the handler log into.
pub async fn request_id(State(state): State<Arc<AppState>>, mut req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(RequestId::from_raw)
        .unwrap_or_else(RequestId::new);

    let timeout = Duration::from_secs(state.config.load().limits.request_timeout_secs);
    let ctx = RequestContext::new(request_id.clone(), timeout);
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>().copied() {
        ctx.set_client_addr(addr.ip().to_string());
    }
    req.extensions_mut().insert(ctx);

    let span = request_span(&request_id);
    let mut response = next.run(req).instrument(span.clone()).await;
    record_status(&span, response.status().as_u16());

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Live auth (§4.9): if both API-key and bearer are disabled, passes
/// through. Otherwise validates `x-api-key` (constant-time comparison) or,
/// if bearer is allowed, `Authorization: Bearer <secret>` (or any bearer
/// token when `allow_subscription` is set). The config snapshot is
/// re-loaded on every request, so a reload takes effect immediately
/// without any separately cached decision to invalidate.
pub async fn auth(State(state): State<Arc<AppState>>, req: Request<Body>, next: Next) -> Response {
    let snapshot = state.config.load();
    let auth_cfg = &snapshot.auth;

    if auth_cfg.api_key.is_none() && !auth_cfg.allow_bearer {
        return next.run(req).await;
    }

    let api_key_header = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());
    let authorization_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let mut authorized = false;

    if let (Some(expected), Some(supplied)) = (auth_cfg.api_key.as_deref(), api_key_header) {
        if secure_compare(expected, supplied) {
            authorized = true;
        }
    }

    if !authorized && auth_cfg.allow_bearer {
        if let Some(bearer) = authorization_header.and_then(|h| h.strip_prefix("Bearer ")) {
            if auth_cfg.allow_subscription {
                authorized = true;
            } else if let Some(expected) = auth_cfg.api_key.as_deref() {
                authorized = secure_compare(expected, bearer);
            }
        }
    }

    if authorized {
        next.run(req).await
    } else {
        RelayError::AuthenticationError.into_response()
    }
}

/// Body size limit (§4.9, §4.3 "body-too-large signal"): reads the body
/// fully so later stages never see a partial read, marking the request
/// context's `body_too_large` flag on overflow rather than failing
/// immediately, so the handler emits a uniform 413 alongside its other
/// fail-fast checks.
pub async fn body_size_limit(State(state): State<Arc<AppState>>, mut req: Request<Body>, next: Next) -> Response {
    let max_bytes = state.config.load().limits.max_body_bytes;
    let ctx = req.extensions().get::<RequestContext>().cloned();

    let (parts, body) = req.into_parts();
    match to_bytes(body, max_bytes + 1).await {
        Ok(bytes) if bytes.len() > max_bytes => {
            if let Some(ctx) = &ctx {
                ctx.set_body_too_large(true);
            }
            req = Request::from_parts(parts, Body::from(bytes));
        }
        Ok(bytes) => {
            req = Request::from_parts(parts, Body::from(bytes));
        }
        Err(_) => {
            return RelayError::RequestTooLarge.into_response();
        }
    }

    next.run(req).await
}

/// Concurrency limit (§4.9, optional): a bounded semaphore rejecting with
/// 503 when saturated rather than queuing, since queuing would violate the
/// tight `ReadTimeout`/slowloris posture of §5.
pub async fn concurrency_limit(
    State(semaphore): State<Arc<Semaphore>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    match semaphore.try_acquire() {
        Ok(_permit) => next.run(req).await,
        Err(_) => RelayError::NoProviders.into_response(),
    }
}

/// Logging (§4.9): one structured event per request at completion, with
/// status, duration, and the request id. Never logs request/response
/// bodies itself; the debug/metrics sink (`relay_telemetry::RequestTrace`)
/// owns byte/event counts when enabled.
pub async fn logging(req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.to_string())
        .unwrap_or_default();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started_at = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = started_at.elapsed().as_millis() as u64,
        "request completed",
    );

    response
}
