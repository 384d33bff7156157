//! Configuration management for the Watch Service
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Ledger family the service watches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    /// Stellar, through a Horizon server
    Horizon,
    /// Ethereum, through an Etherscan-compatible explorer
    Etherscan,
}

impl LedgerKind {
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LedgerKind::Horizon => "https://horizon-testnet.stellar.org",
            LedgerKind::Etherscan => "https://api-sepolia.etherscan.io/api",
        }
    }

    pub fn native_asset(&self) -> &'static str {
        match self {
            LedgerKind::Horizon => payment_watcher::horizon::NATIVE_ASSET,
            LedgerKind::Etherscan => payment_watcher::etherscan::NATIVE_ASSET,
        }
    }
}

impl FromStr for LedgerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "horizon" | "stellar" | "xlm" => Ok(LedgerKind::Horizon),
            "etherscan" | "ethereum" | "eth" => Ok(LedgerKind::Etherscan),
            other => anyhow::bail!("Unknown ledger kind: {} (expected horizon/etherscan)", other),
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKind::Horizon => f.write_str("horizon"),
            LedgerKind::Etherscan => f.write_str("etherscan"),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Which explorer API to talk to
    pub ledger_kind: LedgerKind,

    /// Explorer base URL
    pub ledger_endpoint: String,

    /// Account receiving payments
    pub wallet_address: String,

    /// Etherscan API key (required for etherscan)
    pub etherscan_api_key: Option<String>,

    /// Label for amounts without an asset code
    pub native_asset: String,

    /// Amount advertised in payment requests
    pub stated_amount: String,

    /// Delay between polls in seconds
    pub poll_interval_secs: u64,

    /// Watch duration in seconds
    pub max_duration_secs: u64,

    /// Records per history page
    pub page_size: u32,

    /// Per-request explorer timeout in seconds
    pub request_timeout_secs: u64,

    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenv::dotenv().ok();

        let ledger_kind: LedgerKind = env::var("LEDGER_KIND")
            .unwrap_or_else(|_| "horizon".to_string())
            .parse()
            .context("Invalid LEDGER_KIND")?;

        let config = Config {
            ledger_kind,

            ledger_endpoint: env::var("LEDGER_ENDPOINT")
                .unwrap_or_else(|_| ledger_kind.default_endpoint().to_string()),

            wallet_address: env::var("WALLET_ADDRESS").unwrap_or_default(),

            etherscan_api_key: env::var("ETHERSCAN_API_KEY").ok(),

            native_asset: env::var("NATIVE_ASSET")
                .unwrap_or_else(|_| ledger_kind.native_asset().to_string()),

            stated_amount: env::var("STATED_AMOUNT").unwrap_or_else(|_| "30".to_string()),

            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid POLL_INTERVAL_SECS")?,

            max_duration_secs: env::var("MAX_DURATION_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid MAX_DURATION_SECS")?,

            page_size: env::var("PAGE_SIZE")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .context("Invalid PAGE_SIZE")?,

            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid REQUEST_TIMEOUT_SECS")?,

            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("Invalid API_PORT")?,
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.wallet_address.trim().is_empty() {
            anyhow::bail!("WALLET_ADDRESS is required");
        }

        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.poll_interval_secs == 0 {
            anyhow::bail!("POLL_INTERVAL_SECS must be greater than 0");
        }

        if self.max_duration_secs == 0 {
            anyhow::bail!("MAX_DURATION_SECS must be greater than 0");
        }

        if self.page_size == 0 {
            anyhow::bail!("PAGE_SIZE must be greater than 0");
        }

        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than 0");
        }

        if self.ledger_kind == LedgerKind::Etherscan && self.etherscan_api_key.is_none() {
            anyhow::bail!("ETHERSCAN_API_KEY is required when LEDGER_KIND=etherscan");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
