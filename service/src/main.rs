#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

use std::{net::SocketAddr, sync::Arc};

use clap::Parser;
use nonce_guard::{config::Config, http::router, nonce::ReplayGuard};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nonce-guard", about = "HTTP service rejecting replayed requests")]
struct Args {
    /// YAML configuration file. Environment variables prefixed NG_ override it.
    #[arg(long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    // Load and validate configuration first (fail-fast)
    let config = Config::load_from(&args.config).map_err(|e| anyhow::anyhow!("{e}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.level))
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "nonce-guard starting up"
    );

    // Created inside the runtime so the background sweeper can start
    let guard = Arc::new(ReplayGuard::new(config.nonce.guard_settings()));
    if guard.is_enabled() {
        tracing::info!(
            whitelist = ?config.nonce.actions.whitelist,
            blacklist = ?config.nonce.actions.blacklist,
            "nonce checking enabled"
        );
    } else {
        tracing::warn!("nonce checking disabled - replayed requests will be accepted");
    }

    let app = router(guard).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Starting server at http://{}/api", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
