//! Router assembly and process lifecycle (§2 "HTTP server", §5 timeouts,
//! §9 "graceful shutdown"): a `ServerConfig` plus a `start()` that returns a
//! `ServerHandle` wrapping a `CancellationToken` so a caller can
//! `shutdown()` then `drain()`.

pub mod handler;
pub mod middleware;
pub mod state;
pub mod stream;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use relay_config::LiveConfig;
use relay_core::error::RelayError;

pub use state::AppState;

/// Process-level server configuration. Per-request `ReadTimeout`/
/// `WriteTimeout` live in [`relay_config::LimitsConfig::request_timeout_secs`]
/// instead, since they're a config-reloadable property of the live snapshot
/// rather than a bind-time one; `idle_timeout` is kept here since nothing
/// reads it from config yet (no keep-alive reaper is wired into
/// `axum::serve` — tracked as a possible follow-up, not a regression, since
/// hyper already drops genuinely dead connections on read error).
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            idle_timeout: Duration::from_secs(120),
        }
    }
}

/// Bounds how long the handler may take to produce a response (§5
/// `WriteTimeout`). Only guards time-to-first-byte: once a streaming body is
/// returned the timeout future is done polling, so a long SSE stream is
/// never cut short by it.
async fn request_timeout(State(state): State<Arc<AppState>>, req: Request<Body>, next: Next) -> Response {
    let timeout = Duration::from_secs(state.config.load().limits.request_timeout_secs);
    match tokio::time::timeout(timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => RelayError::Timeout.into_response(),
    }
}

/// Builds the full axum `Router`: the proxied Messages API, the
/// introspection endpoints, and the middleware chain from §4.9 layered in
/// the order the spec describes — request-id outermost, logging innermost,
/// so request-id is stamped before everything else runs and logging sees
/// the final response exactly as the handler produced it.
pub fn build_router(state: Arc<AppState>) -> Router {
    let concurrency = state
        .config
        .load()
        .limits
        .max_concurrency
        .map(|n| Arc::new(Semaphore::new(n)));

    let mut router = Router::new()
        .route("/v1/messages", post(handler::messages))
        .route("/v1/models", get(handler::list_models))
        .route("/v1/providers", get(handler::list_providers))
        .route("/healthz", get(handler::healthz))
        .route("/readyz", get(handler::readyz))
        .with_state(state.clone());

    router = router.layer(axum::middleware::from_fn_with_state(state.clone(), request_timeout));
    router = router.layer(axum::middleware::from_fn(middleware::logging));

    if let Some(semaphore) = concurrency {
        router = router.layer(axum::middleware::from_fn_with_state(
            semaphore,
            middleware::concurrency_limit,
        ));
    }

    router
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::body_size_limit,
        ))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::auth))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::request_id,
        ))
        .layer(CorsLayer::permissive())
}

/// Starts the server: builds the router, binds the listener, and spawns
/// the accept loop plus the config watcher as background tasks tracked by
/// the returned [`ServerHandle`].
pub async fn start(
    config: ServerConfig,
    live_config: Arc<LiveConfig>,
    config_watch_path: Option<std::path::PathBuf>,
) -> std::io::Result<ServerHandle> {
    let state = Arc::new(AppState::new(live_config.clone()));
    let router = build_router(state.clone());

    let listener = TcpListener::bind(config.addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "relay server listening");

    let shutdown = CancellationToken::new();
    let shutdown_for_serve = shutdown.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown_for_serve.cancelled().await;
        })
        .await
        .ok();
    });

    let watcher = match config_watch_path {
        Some(path) => Some(relay_config::watch(path, live_config.clone()).map_err(std::io::Error::other)?),
        None => None,
    };

    // Rebuilds providers and the router whenever the watcher stores a new
    // snapshot; stops on its own once `shutdown` fires since `changed()`
    // races `cancelled()` below.
    let mut reload_rx = live_config.subscribe();
    let reload_state = state.clone();
    let shutdown_for_reload = shutdown.clone();
    let reload_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_for_reload.cancelled() => break,
                result = reload_rx.changed() => {
                    if result.is_err() {
                        break;
                    }
                    reload_state.refresh_from_config();
                }
            }
        }
    });

    Ok(ServerHandle {
        local_addr,
        shutdown,
        server: server_task,
        reload: reload_task,
        state,
        _watcher: watcher,
    })
}

/// Keeps the accept loop and the config watcher alive; `shutdown()` is
/// idempotent (cancelling an already-cancelled token is a no-op), `drain()`
/// awaits in-flight requests and returns promptly once the server task
/// exits (§8 "graceful shutdown").
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
    reload: tokio::task::JoinHandle<()>,
    pub state: Arc<AppState>,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        tracing::info!("relay server shutdown initiated");
        self.shutdown.cancel();
    }

    pub async fn drain(self) {
        let _ = self.server.await;
        let _ = self.reload.await;
        tracing::debug!("relay server task drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_config::ConfigFile;

    async fn test_handle() -> ServerHandle {
        let live = Arc::new(LiveConfig::new(ConfigFile::default()));
        let config = ServerConfig {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..ServerConfig::default()
        };
        start(config, live, None).await.unwrap()
    }

    #[tokio::test]
    async fn server_starts_and_serves_healthz() {
        let handle = test_handle().await;
        let url = format!("http://{}/healthz", handle.local_addr);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        handle.shutdown();
        handle.drain().await;
    }

    #[tokio::test]
    async fn readyz_is_ok_with_no_providers_configured() {
        let handle = test_handle().await;
        let url = format!("http://{}/readyz", handle.local_addr);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        handle.shutdown();
        handle.drain().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let handle = test_handle().await;
        handle.shutdown();
        handle.shutdown();
        handle.drain().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_accept_loop() {
        let handle = test_handle().await;
        let addr = handle.local_addr;
        handle.shutdown();
        handle.drain().await;

        let result = reqwest::get(format!("http://{addr}/healthz")).await;
        assert!(result.is_err(), "expected connection refused after shutdown");
    }

    #[tokio::test]
    async fn drain_completes_promptly_with_no_in_flight_requests() {
        let handle = test_handle().await;
        handle.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), handle.drain()).await;
        assert!(result.is_ok(), "drain should complete within 5s");
    }
}
