#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # provctl
//!
//! Router provisioning service.
//!
//! provctl accepts provisioning requests over HTTP, opens an SSH session to
//! the target router (preferring its VPN address), runs the requested
//! commands in order and reports per-command results. Requests are gated by a
//! pre-shared API key and a per-client rate limiter.
//!
//! ## API surface
//!
//! | Method | Path                 | Auth | Description                        |
//! |--------|----------------------|------|------------------------------------|
//! | GET    | `/health`            | No   | Liveness probe with counters       |
//! | POST   | `/api/v1/provision`  | Yes  | Run a command batch on a router    |
//! | POST   | `/api/v1/verify`     | Yes  | Connectivity check                 |
//! | POST   | `/api/v1/live-data`  | Yes  | Live router data (501)             |
//! | POST   | `/api/v1/execute`    | Yes  | Execute by router id (501)         |
//!
//! Auth accepts `X-API-Key: <key>` or `Authorization: Bearer <key>`.

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use provctl::{routes, AppState, Config};

/// Router provisioning service.
#[derive(Parser)]
#[command(name = "provctl", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("provctl: {e}");
            return ExitCode::FAILURE;
        }
    };

    // RUST_LOG wins over the configured level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("provctl v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.server.listen);
    info!(
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        "Rate limiting enabled"
    );

    if config.auth.api_key.is_empty() {
        warn!("No API key configured, authentication is disabled. Set PROVCTL_API_KEY or update config");
    }
    if !config.ssh.verify_host_key {
        warn!("SSH host key verification is disabled, any router key is accepted");
    }

    let state = AppState::new(config);

    let cancel = CancellationToken::new();
    let sweeper = state.limiter.spawn_sweeper(
        state.config.rate_limit.sweep_interval(),
        state.config.rate_limit.retention(),
        cancel.clone(),
    );

    let listener = match TcpListener::bind(&state.config.server.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {e}", state.config.server.listen);
            cancel.cancel();
            return ExitCode::FAILURE;
        }
    };

    let app = routes::router(state.clone());
    info!("Server ready");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    info!("Shutting down...");
    cancel.cancel();
    if let Err(e) = sweeper.await {
        warn!("Limiter sweeper ended abnormally: {e}");
    }

    let active = state.metrics.snapshot().active_connections;
    if active > 0 {
        warn!(active, "Exiting with router sessions still open");
    }

    match served {
        Ok(()) => {
            info!("Goodbye");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Server error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
}
