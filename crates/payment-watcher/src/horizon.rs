//! Stellar Horizon history source
//!
//! `GET {endpoint}/accounts/{account}/transactions` pages through HAL
//! collections; the continuation cursor lives in the `next` link's query.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use watch_common::{MemoType, OperationRecord, Page, Result, TransactionRecord};

use crate::source::{build_http_client, malformed, send_json, LedgerSource, DEFAULT_REQUEST_TIMEOUT};

pub const NATIVE_ASSET: &str = "XLM";

#[derive(Debug, Deserialize)]
struct Collection {
    #[serde(rename = "_embedded")]
    embedded: Embedded,
    #[serde(rename = "_links", default)]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    records: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Links {
    next: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct HorizonTransaction {
    id: String,
    #[serde(default)]
    memo_type: MemoType,
    #[serde(default)]
    memo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HorizonOperation {
    #[serde(default)]
    transaction_hash: String,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    asset_code: Option<String>,
}

/// Horizon client
pub struct HorizonSource {
    endpoint: String,
    client: reqwest::Client,
    native_asset: String,
}

impl HorizonSource {
    /// Create a client for `endpoint` (e.g. "https://horizon-testnet.stellar.org")
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint: String = endpoint.into();
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: build_http_client(timeout)?,
            native_asset: NATIVE_ASSET.to_string(),
        })
    }

    /// Override the label used for native-asset amounts
    pub fn with_native_asset(mut self, label: impl Into<String>) -> Self {
        self.native_asset = label.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LedgerSource for HorizonSource {
    async fn fetch_page(&self, account: &str, cursor: Option<&str>, limit: u32) -> Result<Page> {
        let url = format!("{}/accounts/{}/transactions", self.endpoint, account);
        debug!("Fetching transactions with cursor: {}", cursor.unwrap_or("initial"));

        let mut request = self.client.get(&url).query(&[("limit", limit.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let collection: Collection = send_json(request).await?;
        let records = collection
            .embedded
            .records
            .into_iter()
            .map(transaction_from_raw)
            .collect::<Result<Vec<_>>>()?;

        let next_cursor = collection
            .links
            .and_then(|links| links.next)
            .and_then(|next| cursor_from_href(&next.href));

        debug!("Fetched {} transactions", records.len());

        Ok(Page::new(records, next_cursor))
    }

    async fn fetch_operations(&self, transaction_id: &str) -> Result<Vec<OperationRecord>> {
        let url = format!("{}/transactions/{}/operations", self.endpoint, transaction_id);

        let collection: Collection = send_json(self.client.get(&url)).await?;
        collection
            .embedded
            .records
            .into_iter()
            .map(|raw| {
                let op: HorizonOperation = serde_json::from_value(raw).map_err(malformed)?;
                Ok(OperationRecord {
                    transaction_id: if op.transaction_hash.is_empty() {
                        transaction_id.to_string()
                    } else {
                        op.transaction_hash
                    },
                    amount: op.amount,
                    asset_code: op.asset_code,
                })
            })
            .collect()
    }

    fn native_asset(&self) -> &str {
        &self.native_asset
    }
}

fn transaction_from_raw(raw: serde_json::Value) -> Result<TransactionRecord> {
    let tx: HorizonTransaction = serde_json::from_value(raw.clone()).map_err(malformed)?;
    Ok(TransactionRecord {
        id: tx.id,
        memo_type: tx.memo_type,
        memo: tx.memo,
        to: None,
        value: None,
        raw,
    })
}

/// Extract the `cursor` query parameter of a HAL link
fn cursor_from_href(href: &str) -> Option<String> {
    let url = Url::parse(href).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "cursor")
        .map(|(_, value)| value.into_owned())
        .filter(|cursor| !cursor.is_empty())
}
