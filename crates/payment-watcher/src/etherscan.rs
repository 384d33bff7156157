//! Etherscan-compatible history source
//!
//! History comes from `module=account&action=txlist`, paged with
//! `page`/`offset`. The cursor is the next page number.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use watch_common::{Error, MemoType, OperationRecord, Page, Result, TransactionRecord};

use crate::source::{build_http_client, malformed, send_json, LedgerSource, DEFAULT_REQUEST_TIMEOUT};

pub const NATIVE_ASSET: &str = "ETH";

/// Envelope shared by the `account` module endpoints
#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

/// Envelope of the `proxy` module (JSON-RPC passthrough)
#[derive(Debug, Deserialize)]
struct ProxyResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EtherscanTransaction {
    hash: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    hash: String,
    value: String,
}

/// Etherscan client
pub struct EtherscanSource {
    endpoint: String,
    api_key: String,
    start_block: u64,
    client: reqwest::Client,
    native_asset: String,
}

impl EtherscanSource {
    /// Create a client for `endpoint` (e.g. "https://api-sepolia.etherscan.io/api")
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, api_key, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            start_block: 0,
            client: build_http_client(timeout)?,
            native_asset: NATIVE_ASSET.to_string(),
        })
    }

    /// Only report transactions mined at or after `block`, unless a watch
    /// asks for its own starting height
    pub fn with_start_block(mut self, block: u64) -> Self {
        self.start_block = block;
        self
    }

    /// Override the label used for native-asset amounts
    pub fn with_native_asset(mut self, label: impl Into<String>) -> Self {
        self.native_asset = label.into();
        self
    }

    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    /// Current chain head, used to ignore payments made before a watch began
    pub async fn current_block_number(&self) -> Result<u64> {
        let request = self.client.get(&self.endpoint).query(&[
            ("module", "proxy"),
            ("action", "eth_blockNumber"),
            ("apikey", self.api_key.as_str()),
        ]);

        let response: ProxyResponse<String> = send_json(request).await?;
        let hex = proxy_result(response)?;
        parse_block_number(&hex)
            .ok_or_else(|| Error::upstream(200, format!("Invalid block number: {}", hex)))
    }
}

#[async_trait]
impl LedgerSource for EtherscanSource {
    async fn fetch_page(&self, account: &str, cursor: Option<&str>, limit: u32) -> Result<Page> {
        self.fetch_page_from(account, cursor, limit, None).await
    }

    async fn fetch_page_from(
        &self,
        account: &str,
        cursor: Option<&str>,
        limit: u32,
        from_height: Option<u64>,
    ) -> Result<Page> {
        let start_block = from_height.unwrap_or(self.start_block);
        let page: u32 = match cursor {
            Some(cursor) => cursor
                .parse()
                .map_err(|_| Error::Config(format!("Invalid page cursor: {}", cursor)))?,
            None => 1,
        };

        debug!(
            "Fetching txlist page {} for {} from block {}",
            page, account, start_block
        );

        let request = self.client.get(&self.endpoint).query(&[
            ("module", "account".to_string()),
            ("action", "txlist".to_string()),
            ("address", account.to_string()),
            ("startblock", start_block.to_string()),
            ("sort", "asc".to_string()),
            ("page", page.to_string()),
            ("offset", limit.to_string()),
            ("apikey", self.api_key.clone()),
        ]);

        let response: AccountResponse = send_json(request).await?;
        let raw_records = match response.result {
            serde_json::Value::Array(records) => records,
            // "NOTOK" responses carry the reason in `result`
            other => {
                let reason = other.as_str().map(str::to_string).unwrap_or_else(|| other.to_string());
                return Err(Error::upstream(
                    200,
                    format!("{} (status {}): {}", response.message, response.status, reason),
                ));
            }
        };

        let records = raw_records
            .into_iter()
            .map(transaction_from_raw)
            .collect::<Result<Vec<_>>>()?;

        let next_cursor = if limit > 0 && records.len() as u32 >= limit {
            Some((page + 1).to_string())
        } else {
            None
        };

        Ok(Page::new(records, next_cursor))
    }

    async fn current_height(&self) -> Result<Option<u64>> {
        self.current_block_number().await.map(Some)
    }

    async fn fetch_operations(&self, transaction_id: &str) -> Result<Vec<OperationRecord>> {
        let request = self.client.get(&self.endpoint).query(&[
            ("module", "proxy"),
            ("action", "eth_getTransactionByHash"),
            ("txhash", transaction_id),
            ("apikey", self.api_key.as_str()),
        ]);

        let response: ProxyResponse<RpcTransaction> = send_json(request).await?;
        let tx = proxy_result(response)?;
        let wei = parse_hex_quantity(&tx.value)
            .ok_or_else(|| Error::upstream(200, format!("Invalid value: {}", tx.value)))?;

        Ok(vec![OperationRecord {
            transaction_id: tx.hash,
            amount: Some(wei.to_string()),
            asset_code: None,
        }])
    }

    fn native_asset(&self) -> &str {
        &self.native_asset
    }
}

fn proxy_result<T>(response: ProxyResponse<T>) -> Result<T> {
    match (response.result, response.error) {
        (Some(result), None) => Ok(result),
        (_, Some(error)) => Err(Error::upstream(200, error.to_string())),
        (None, None) => Err(Error::upstream(200, "Empty proxy result")),
    }
}

fn transaction_from_raw(raw: serde_json::Value) -> Result<TransactionRecord> {
    let tx: EtherscanTransaction = serde_json::from_value(raw.clone()).map_err(malformed)?;
    Ok(TransactionRecord {
        id: tx.hash,
        memo_type: MemoType::None,
        memo: None,
        to: Some(tx.to),
        value: Some(tx.value),
        raw,
    })
}

/// Block numbers must fit in a u64
fn parse_block_number(hex: &str) -> Option<u64> {
    parse_hex_quantity(hex).and_then(|n| u64::try_from(n).ok())
}

/// Parse a JSON-RPC hex quantity such as "0x16345785d8a0000"
fn parse_hex_quantity(hex: &str) -> Option<u128> {
    let digits = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X"))?;
    if digits.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(digits, 16).ok()
}
