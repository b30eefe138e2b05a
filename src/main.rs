mod auth;
mod config;
mod health;
mod http;
mod metrics;
mod storage;
mod sync;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::auth::registry::SessionRegistry;
use crate::auth::{CookieSessionGate, SessionGate};
use crate::config::Config;
use crate::metrics::MetricsRegistry;
use crate::storage::ObjectStore;
use crate::sync::scheduler::SyncScheduler;
use crate::sync::tags::TagStore;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "sitemirror", about = "Multi-tenant static site server")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/sitemirror/config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Global state shared across all request handlers and background tasks.
pub struct AppState {
    pub config: Arc<Config>,
    /// Root of the local mirror; tenant trees and tag files live here.
    pub site_dir: PathBuf,
    pub tags: TagStore,
    /// Per-host session gates, created lazily on first request.
    pub sessions: SessionRegistry,
    /// Remote bundle store; absent when sync is disabled.
    pub store: Option<Arc<dyn ObjectStore>>,
    pub metrics: MetricsRegistry,
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: Arc<AppState>, shutdown: CancellationToken) -> Result<()> {
    let app = http::handler::create_router(Arc::clone(&state));

    let listen_addr: std::net::SocketAddr = state
        .config
        .server
        .listen
        .parse()
        .context("invalid listen address")?;

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;
    let config = Arc::new(config);

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(config_path = %cli.config, "starting sitemirror");

    // ---- Ensure the mirror root exists ----
    let site_dir = PathBuf::from(&config.site_dir);
    tokio::fs::create_dir_all(&site_dir)
        .await
        .with_context(|| format!("failed to create site dir: {}", config.site_dir))?;

    // ---- Object store ----
    let store: Option<Arc<dyn ObjectStore>> = if config.sync.enabled {
        Some(Arc::new(
            storage::s3::build_object_store(&config.sync).await?,
        ))
    } else {
        tracing::warn!("bundle sync disabled; serving the existing mirror only");
        None
    };

    // ---- Metrics ----
    let metrics = MetricsRegistry::new();

    // ---- Session gates ----
    let session_cookie = config.auth.session_cookie.clone();
    let sessions = SessionRegistry::new(move |host| {
        tracing::debug!(%host, "creating session gate");
        Arc::new(CookieSessionGate::new(session_cookie.clone())) as Arc<dyn SessionGate>
    });

    // ---- App state ----
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        site_dir: site_dir.clone(),
        tags: TagStore::new(&site_dir),
        sessions,
        store: store.clone(),
        metrics: metrics.clone(),
    });

    // ---- Shutdown wiring ----
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    // ---- Background sync scheduler ----
    let scheduler_handle = store.map(|store| {
        let scheduler = SyncScheduler::new(
            &site_dir,
            store,
            Duration::from_secs(config.sync.interval_secs),
            metrics.clone(),
            shutdown.clone(),
        );
        tokio::spawn(scheduler.run())
    });

    // ---- Serve until shutdown ----
    run_http_server(Arc::clone(&state), shutdown.clone()).await?;

    // A cycle already in progress is allowed to finish; the scheduler
    // observes the token before starting another one.
    shutdown.cancel();
    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "sync scheduler task failed");
        }
    }

    tracing::info!("sitemirror shut down cleanly");
    Ok(())
}
