//! Watch Service
//!
//! HTTP front end for the payment watcher.
//!
//! ## Architecture
//!
//! The service owns one ledger source (Horizon or Etherscan) and a
//! `WatchRegistry` of live watches against the configured wallet:
//! - `config`: Configuration management
//! - `ledger`: Ledger source selection
//! - `payment_request`: Memo and wallet URI generation
//! - `api`: REST handlers
//!
//! ## Endpoints
//!
//! - `POST /api/payment-request` - Generate a memo and payment URI
//! - `POST /api/watch` - Start a watch (`{memo}` or `{value}`)
//! - `GET /api/watch/{id}` - Current status of a watch
//! - `GET /api/watch/{id}/result` - Wait for the outcome of a watch
//! - `DELETE /api/watch/{id}` - Cancel a watch
//! - `POST /check_transaction` - Watch for a memo and answer when done
//! - `GET /health` - Health check

pub mod api;
pub mod config;
pub mod ledger;
pub mod payment_request;

use axum::{
    routing::{get, post},
    Router,
};
use payment_watcher::{LedgerSource, PaymentWatcher, WatchRegistry};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::{Config, LedgerKind};

/// Parameters applied to every watch started through the API
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub ledger_kind: LedgerKind,

    /// Wallet whose history is searched
    pub account: String,

    /// Amount advertised in payment requests
    pub stated_amount: String,

    pub poll_interval: Duration,

    pub max_duration: Duration,
}

impl WatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ledger_kind: config.ledger_kind,
            account: config.wallet_address.clone(),
            stated_amount: config.stated_amount.clone(),
            poll_interval: config.poll_interval(),
            max_duration: config.max_duration(),
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub registry: WatchRegistry,
    pub settings: WatchSettings,
}

impl AppState {
    /// Create new application state
    pub fn new(source: Arc<dyn LedgerSource>, page_size: u32, settings: WatchSettings) -> Self {
        Self {
            registry: WatchRegistry::new(PaymentWatcher::with_page_size(source, page_size)),
            settings,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Health check
        .route("/health", get(api::health_handler))
        // Payment requests
        .route("/api/payment-request", post(api::payment_request_handler))
        // Watches
        .route("/api/watch", post(api::start_watch_handler))
        .route(
            "/api/watch/{id}",
            get(api::watch_status_handler).delete(api::cancel_watch_handler),
        )
        .route("/api/watch/{id}/result", get(api::watch_result_handler))
        // Blocking memo check
        .route("/check_transaction", post(api::check_transaction_handler))
        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
