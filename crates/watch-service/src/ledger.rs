//! Ledger source selection

use anyhow::{Context, Result};
use payment_watcher::{EtherscanSource, HorizonSource, LedgerSource};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, LedgerKind};

/// Build the explorer source described by `config`.
///
/// Etherscan sources only report transactions from the current chain head
/// onwards; if the head cannot be fetched the whole history is searched.
pub async fn connect(config: &Config) -> Result<Arc<dyn LedgerSource>> {
    match config.ledger_kind {
        LedgerKind::Horizon => {
            let source =
                HorizonSource::with_timeout(&config.ledger_endpoint, config.request_timeout())
                    .context("Failed to create Horizon client")?
                    .with_native_asset(&config.native_asset);
            info!("Using Horizon at {}", source.endpoint());
            Ok(Arc::new(source))
        }
        LedgerKind::Etherscan => {
            let api_key = config
                .etherscan_api_key
                .as_deref()
                .context("ETHERSCAN_API_KEY is required for etherscan")?;

            let source = EtherscanSource::with_timeout(
                &config.ledger_endpoint,
                api_key,
                config.request_timeout(),
            )
            .context("Failed to create Etherscan client")?
            .with_native_asset(&config.native_asset);

            let source = match source.current_block_number().await {
                Ok(block) => {
                    info!("Watching transactions from block {}", block);
                    source.with_start_block(block)
                }
                Err(e) => {
                    warn!("Failed to get current block number, searching full history: {}", e);
                    source
                }
            };

            info!("Using Etherscan at {}", config.ledger_endpoint);
            Ok(Arc::new(source))
        }
    }
}
