//! Watch Service
//!
//! Main entry point for the payment watch HTTP service.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watch_service::{create_router, ledger, AppState, Config, WatchSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,payment_watcher=debug,watch_service=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Watch Service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded");
    info!("  Ledger: {} ({})", config.ledger_kind, config.ledger_endpoint);
    info!("  Wallet address: {}", config.wallet_address);
    info!("  Stated amount: {} {}", config.stated_amount, config.native_asset);
    info!(
        "  Polling every {}s for up to {}s",
        config.poll_interval_secs, config.max_duration_secs
    );

    let source = ledger::connect(&config).await?;
    let state = AppState::new(source, config.page_size, WatchSettings::from_config(&config));
    let app = create_router(state);

    let api_addr = config.api_address();
    let listener = TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", api_addr))?;
    info!("API server listening on {}", api_addr);
    info!("Health check: http://{}/health", api_addr);

    let api_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server error: {:#}", e);
        }
    });

    tokio::select! {
        _ = api_task => {
            error!("API task terminated unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down Watch Service");

    Ok(())
}
