//! Personal file-synchronization server.
//!
//! This server:
//! - Serves one directory tree (ROOT) to a handful of trusted devices
//! - Authenticates devices by bearer token against a token file
//! - Lets one device at a time hold the write session
//! - Exposes a monotonic "last touch" watermark for change detection

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use treesync_core::SystemClock;
use treesync_local::TokenFile;
use treesync_server::config::Config;
use treesync_server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    let settings = config.settings();

    info!("Starting treesync-server v{}", env!("CARGO_PKG_VERSION"));
    info!("  Host: {}", config.host);
    info!("  Port: {}", config.port);
    info!("  Root: {}", settings.root.display());
    info!("  Staging: {}", settings.staging_dir.display());
    info!("  Fault log: {}", settings.fault_log.display());
    info!("  Session timeout: {}s", config.session_timeout_secs);

    anyhow::ensure!(
        settings.root.is_dir(),
        "ROOT {} is not a directory",
        settings.root.display()
    );

    let tokens = TokenFile::load(&config.tokens_file).await?;
    if tokens.is_empty() {
        warn!(
            "  Auth: token file {} is empty, every request will be rejected",
            config.tokens_file.display()
        );
    } else {
        info!("  Auth: {} token(s) loaded", tokens.len());
    }

    tokio::fs::create_dir_all(&settings.staging_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create staging directory {}",
                settings.staging_dir.display()
            )
        })?;

    let state = AppState::new(&settings, Arc::new(tokens), Arc::new(SystemClock));
    let app = router(state, settings.max_body_bytes);

    // Bind and serve
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C, initiating shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
        info!("Received SIGTERM, initiating shutdown");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
