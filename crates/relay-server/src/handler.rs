//! Request handler (§4.8): the per-request sequence for `POST /v1/messages`,
//! plus the read-only introspection endpoints.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde_json::json;

use relay_core::context::RequestContext;
use relay_core::error::RelayError;
use relay_providers::{extract_model_and_stream, rewrite_model_field, KeyPool};
use relay_router::{filter_by_target, target_provider_name, ProviderInfo};
use relay_sse::frame::{is_event_stream, media_type, set_sse_response_headers};
use relay_telemetry::{record_provider, record_status, RequestTrace};
use relay_thinking::{fast_detect, rewrite_request, rewrite_response, SseSignatureProcessor};

use crate::state::AppState;
use crate::stream::rewrite_thinking_stream;

const MAX_READ_BODY_BYTES: usize = 64 * 1024 * 1024;

/// `POST /v1/messages`.
pub async fn messages(State(state): State<Arc<AppState>>, req: Request<Body>) -> Response {
    let span = tracing::Span::current();

    let Some(ctx) = req.extensions().get::<RequestContext>().cloned() else {
        return RelayError::InternalError("request context missing".to_string()).into_response();
    };
    if ctx.body_too_large() {
        return RelayError::RequestTooLarge.into_response();
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let inbound_headers = req.headers().clone();

    let body = match to_bytes(req.into_body(), MAX_READ_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return RelayError::RequestTooLarge.into_response(),
    };

    // Step 2: extract model from body, restoring nothing since extraction
    // only borrows (relay_providers::extract_model_and_stream never
    // consumes `body`).
    let (model, wants_stream) = extract_model_and_stream(&body);
    let model = model.unwrap_or_else(|| "unknown".to_string());
    ctx.set_model(model.clone());
    ctx.set_thinking_affinity(fast_detect(&body));

    let snapshot = state.config.load();
    let entries = state.provider_entries();

    // Step 3: select provider.
    let candidates: Vec<ProviderInfo> = entries
        .iter()
        .map(|e| ProviderInfo {
            provider: e.proxy.provider().clone(),
            is_healthy: e.proxy.is_healthy(),
            weight: e.weight,
            priority: e.priority,
        })
        .collect();
    let target = target_provider_name(&model, &snapshot.routing.model_prefixes, &snapshot.routing.default_provider);
    let filtered = filter_by_target(&target, &candidates);

    let router = state.router();
    let selected = match router.select(&filtered).await {
        Ok(info) => info,
        Err(_) => return RelayError::NoProviders.into_response(),
    };

    let Some(entry) = entries.iter().find(|e| e.proxy.provider().name() == selected.provider.name()) else {
        return RelayError::InternalError("selected provider has no matching entry".to_string()).into_response();
    };
    let proxy = entry.proxy.clone();

    ctx.set_provider_name(selected.provider.name());
    ctx.set_routing_strategy(router.name());
    record_provider(&span, selected.provider.name());

    // Step 5: model rewrite.
    let mut outgoing_body = rewrite_model_field(&body, &snapshot.routing.model_rewrite, |m| selected.provider.map_model(m));

    // Step 6: thinking rewrite, gated by the fast detector.
    if fast_detect(&outgoing_body) {
        let (rewritten, _stats) = rewrite_request(&outgoing_body, &model, &state.signature_cache).await;
        outgoing_body = rewritten;
    }

    let client_auth = inbound_headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .or_else(|| inbound_headers.get("x-api-key").and_then(|v| v.to_str().ok()));

    let mut trace = RequestTrace::new(ctx.request_id.clone(), snapshot.logging.debug);
    trace.add_request_bytes(outgoing_body.len() as u64);

    // Step 10: invoke the provider proxy.
    let outcome = match proxy
        .forward(
            &state.http_client,
            method,
            &path,
            &inbound_headers,
            Bytes::from(outgoing_body),
            client_auth,
            ctx.client_addr().as_deref(),
        )
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            trace.finish(Some(selected.provider.name()), err.status_code().as_u16());
            record_status(&span, err.status_code().as_u16());
            return err.into_response();
        }
    };
    trace.mark_upstream_connected();

    if let Some(key_id) = &outcome.key_id {
        ctx.set_selected_key_id(key_id.clone());
    }

    let response = build_response(
        outcome.response,
        outcome.key_id.as_deref(),
        &selected.provider,
        &model,
        wants_stream,
        &state,
        entry,
        &snapshot,
        &mut trace,
    )
    .await;

    record_status(&span, response.status().as_u16());
    trace.finish(Some(selected.provider.name()), response.status().as_u16());
    response
}

/// Step 11-12: response hook plus the relay's own diagnostic headers.
#[allow(clippy::too_many_arguments)]
async fn build_response(
    upstream: reqwest::Response,
    key_id: Option<&str>,
    provider: &Arc<dyn relay_core::provider::Provider>,
    model: &str,
    wants_stream: bool,
    state: &Arc<AppState>,
    entry: &crate::state::ProviderEntry,
    snapshot: &relay_config::ConfigSnapshot,
    trace: &mut RequestTrace,
) -> Response {
    let upstream_status = upstream.status();

    if upstream_status.as_u16() == 429 {
        let retry_after = upstream
            .headers()
            .get(axum::http::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(parse_retry_after)
            .unwrap_or_else(|| std::time::Duration::from_secs(60));
        // §4.5 "MarkKeyExhausted": cool the specific key down rather than
        // leaving it immediately reusable by the next request.
        if let Some(key_id) = key_id {
            entry.proxy.key_pool().mark_exhausted(key_id, retry_after);
        }
        return RelayError::RateLimit { retry_after }.into_response();
    }

    if let Some(key_id) = key_id {
        entry.proxy.key_pool().record_success(key_id);
    }

    let content_type = upstream
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let is_vendor_event_stream = provider.streaming_content_type() != "text/event-stream"
        && media_type(&content_type).eq_ignore_ascii_case(media_type(provider.streaming_content_type()));
    let is_sse = is_event_stream(&content_type) || is_vendor_event_stream;

    let mut response_headers = HeaderMap::new();
    for name in provider.forward_headers() {
        if let Some(value) = upstream.headers().get(*name) {
            if let Ok(header_name) = axum::http::HeaderName::from_bytes(name.as_bytes()) {
                response_headers.insert(header_name, value.clone());
            }
        }
    }

    apply_relay_headers(&mut response_headers, entry, snapshot);

    if !is_sse {
        let status = StatusCode::from_u16(upstream_status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let body_bytes = match upstream.bytes().await {
            Ok(b) => b,
            Err(_) => return RelayError::UpstreamUnavailable("read failed".to_string()).into_response(),
        };
        trace.add_response_bytes(body_bytes.len() as u64);
        trace.mark_upstream_first_byte();

        let rewritten = rewrite_response(&body_bytes, model, &state.signature_cache).await;

        let mut builder = Response::builder().status(status);
        for (name, value) in response_headers.iter() {
            builder = builder.header(name, value);
        }
        return builder
            .body(Body::from(rewritten))
            .unwrap_or_else(|_| RelayError::InternalError("failed to build response".to_string()).into_response());
    }

    set_sse_response_headers(&mut response_headers);
    let status = StatusCode::from_u16(upstream_status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    trace.mark_upstream_first_byte();

    let byte_stream = upstream.bytes_stream();
    let body = if wants_stream {
        let processor = SseSignatureProcessor::new(model.to_string(), state.signature_cache.clone());
        Body::from_stream(rewrite_thinking_stream(byte_stream, processor))
    } else {
        Body::from_stream(byte_stream)
    };

    let mut builder = Response::builder().status(status);
    for (name, value) in response_headers.iter() {
        builder = builder.header(name, value);
    }
    builder
        .body(body)
        .unwrap_or_else(|_| RelayError::InternalError("failed to build response".to_string()).into_response())
}

fn apply_relay_headers(headers: &mut HeaderMap, entry: &crate::state::ProviderEntry, snapshot: &relay_config::ConfigSnapshot) {
    let key_pool = entry.proxy.key_pool();
    if let Ok(v) = HeaderValue::from_str(&key_pool.total_keys().to_string()) {
        headers.insert("x-cc-relay-keys-total", v);
    }
    if let Ok(v) = HeaderValue::from_str(&key_pool.available_keys().to_string()) {
        headers.insert("x-cc-relay-keys-available", v);
    }
    if snapshot.routing.debug {
        if let Ok(v) = HeaderValue::from_str(&snapshot.routing.strategy) {
            headers.insert("x-cc-relay-strategy", v);
        }
        if let Ok(v) = HeaderValue::from_str(entry.proxy.provider().name()) {
            headers.insert("x-cc-relay-provider", v);
        }
    }
}

/// §4.8 "Retry-After parsing": integer seconds, else an HTTP-date, else a
/// 60 s default; always at least 1 s.
fn parse_retry_after(raw: &str) -> std::time::Duration {
    if let Ok(secs) = raw.trim().parse::<u64>() {
        return std::time::Duration::from_secs(secs.max(1));
    }
    if let Ok(when) = chrono::DateTime::parse_from_rfc2822(raw.trim()) {
        let now = chrono::Utc::now();
        let delta = when.with_timezone(&chrono::Utc) - now;
        if delta.num_seconds() > 0 {
            return std::time::Duration::from_secs(delta.num_seconds() as u64);
        }
    }
    std::time::Duration::from_secs(60)
}

/// `GET /v1/models`: aggregated model list across active providers (§6).
pub async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    let entries = state.provider_entries();
    let models: Vec<serde_json::Value> = entries
        .iter()
        .flat_map(|e| {
            let provider_name = e.proxy.provider().name().to_string();
            let owned_by = e.proxy.provider().kind().as_str().to_string();
            e.proxy
                .provider()
                .models()
                .iter()
                .map(move |m| {
                    json!({
                        "id": m,
                        "object": "model",
                        "owned_by": owned_by.clone(),
                        "provider": provider_name.clone(),
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect();
    Json(json!({ "object": "list", "data": models })).into_response()
}

/// `GET /v1/providers` (§6).
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Response {
    let entries = state.provider_entries();
    let providers: Vec<serde_json::Value> = entries
        .iter()
        .map(|e| {
            json!({
                "name": e.proxy.provider().name(),
                "type": e.proxy.provider().kind().as_str(),
                "base_url": e.proxy.provider().base_url(),
                "models": e.proxy.provider().models(),
                "active": true,
                "healthy": e.proxy.is_healthy(),
                "weight": e.weight,
                "priority": e.priority,
                "keys_total": e.proxy.key_pool().total_keys(),
                "keys_available": e.proxy.key_pool().available_keys(),
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": providers })).into_response()
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// `GET /readyz`: ready only while at least one configured provider is
/// healthy (§8 "graceful degradation" — an all-unhealthy process should
/// fail its readiness probe rather than 503 every request silently).
pub async fn readyz(State(state): State<Arc<AppState>>) -> Response {
    let entries = state.provider_entries();
    if entries.is_empty() || entries.iter().any(|e| e.proxy.is_healthy()) {
        (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "not_ready" }))).into_response()
    }
}
