//! Palimpsest Server
//!
//! Upload a PDF, retype any line of it, download the result. Files expire
//! a few minutes after their last use.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palimpsest_server::config::Config;
use palimpsest_server::routes;
use palimpsest_server::session::Reaper;
use palimpsest_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "palimpsest_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Palimpsest Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        folder = %config.upload.folder.display(),
        retention_secs = config.retention.file_retention.as_secs(),
        "Upload folder"
    );

    let app_state = AppState::from_config(config.clone())
        .await
        .context("Failed to initialize application state")?;

    // Nothing is registered yet, so every leftover file is an orphan
    match app_state.registry().force_cleanup().await {
        Ok(deleted) if !deleted.is_empty() => {
            tracing::info!("Removed {} files left by a previous run", deleted.len())
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Startup cleanup failed: {}", e),
    }

    let reaper = Reaper::new(app_state.registry().clone(), config.retention.cleanup_interval)
        .with_orphan_grace(config.retention.orphan_grace)
        .spawn();

    let app = routes::router(app_state.clone());

    // Start server with graceful shutdown
    let ip = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid SERVER_HOST: {}", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    tracing::info!("Palimpsest Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    app_state.registry().shutdown();
    if let Err(e) = reaper.await {
        tracing::warn!("Reaper task ended abnormally: {}", e);
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
