//! Chorus server: presence, sessions and tokens over HTTP and WebSocket.
//!
//! Main entry point that wires all crates together and starts the server.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use chorus_api::{AppState, build_app};
use chorus_core::config::AppConfig;
use chorus_worker::WorkerScheduler;
use chorus_worker::jobs::{JobDependencies, register_defaults};

/// Command-line options. Everything else comes from `config/` and `CHORUS__*`.
#[derive(Debug, Parser)]
#[command(name = "chorus-server", version, about)]
struct Args {
    /// Environment overlay loaded after `config/default.toml`.
    #[arg(long, env = "CHORUS_ENV", default_value = "development")]
    env: String,

    /// Run on in-memory storage, cache and fanout. Nothing survives a restart.
    #[arg(long, env = "CHORUS_EPHEMERAL")]
    ephemeral: bool,

    /// Override `server.port`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_configuration(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {e:#}");
        std::process::exit(1);
    }
}

/// Load configuration and apply command-line overrides.
fn load_configuration(args: &Args) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(&args.env)
        .with_context(|| format!("loading configuration for '{}'", args.env))?;

    if args.ephemeral {
        config.database.backend = "memory".to_string();
        config.cache.provider = "memory".to_string();
        config.realtime.fanout_backend = "memory".to_string();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    Ok(config)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Chorus v{}", env!("CARGO_PKG_VERSION"));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let worker_config = config.worker.clone();

    // ── Services ─────────────────────────────────────────────────
    let state = AppState::build(config)
        .await
        .context("initializing services")?;
    let subscriber = state.realtime.start();

    // ── Maintenance jobs ─────────────────────────────────────────
    let mut scheduler = WorkerScheduler::new().await?;
    register_defaults(
        &mut scheduler,
        &worker_config,
        &JobDependencies {
            sessions: state.sessions.clone(),
            gateway: state.realtime.gateway.clone(),
        },
    )
    .await?;
    scheduler.start().await?;

    // ── HTTP server ──────────────────────────────────────────────
    let app = build_app(state.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Chorus server listening on {}", addr);

    let realtime = state.realtime.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
            // Open sockets keep the server from draining; close them first.
            realtime.shutdown().await;
        })
        .await
        .context("serving HTTP")?;

    // ── Background tasks ─────────────────────────────────────────
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown failed: {}", e);
    }
    if tokio::time::timeout(grace, subscriber).await.is_err() {
        tracing::warn!("Fanout subscriber did not stop within {:?}", grace);
    }
    if let Some(db) = &state.database {
        db.close().await;
    }

    tracing::info!("Chorus server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
