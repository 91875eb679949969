//! Process entry point (§10.5): parse CLI flags, load config, start
//! telemetry, and run the server until a signal tells it to stop.

use std::path::PathBuf;

use clap::Parser;

use relay_config::LiveConfig;
use relay_server::ServerConfig;
use relay_telemetry::LogFormat;

/// A reverse proxy for the Anthropic Messages API.
#[derive(Parser, Debug)]
struct Cli {
    /// Path to the TOML config file. Falls back to `RELAY_CONFIG`, then
    /// `./relay.toml`.
    #[arg(long, env = "RELAY_CONFIG", default_value = "relay.toml")]
    config: PathBuf,

    /// `text` or `json`. Defaults to whatever the config file's
    /// `[logging]` section says.
    #[arg(long)]
    log_format: Option<String>,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: std::net::SocketAddr,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let initial = match relay_config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load config {}: {err}", cli.config.display());
            std::process::exit(1);
        }
    };

    let log_format = cli
        .log_format
        .as_deref()
        .map(|s| s.parse().unwrap_or(LogFormat::Text))
        .unwrap_or(if initial.logging.json { LogFormat::Json } else { LogFormat::Text });
    relay_telemetry::init(log_format, &initial.logging.level);

    tracing::info!(config = %cli.config.display(), "starting cc-relay");

    let live_config = std::sync::Arc::new(LiveConfig::new(initial));
    let server_config = ServerConfig {
        addr: cli.bind,
        ..ServerConfig::default()
    };

    let handle = match relay_server::start(server_config, live_config, Some(cli.config.clone())).await {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!(error = %err, "failed to start server");
            std::process::exit(1);
        }
    };

    tracing::info!(addr = %handle.local_addr, "cc-relay ready");

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining in-flight requests");

    handle.shutdown();
    handle.drain().await;
    tracing::info!("cc-relay stopped");
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
