//! Pluggable ledger history source
//!
//! A source performs single requests against a block explorer. It never
//! retries: the watcher's next poll is the retry.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use watch_common::{Error, OperationRecord, Page, Result};

/// Records per history page unless configured otherwise
pub const DEFAULT_PAGE_SIZE: u32 = 200;

/// Upper bound on a single explorer request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetch contract the watcher relies on
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Fetch one page of `account`'s transaction history.
    ///
    /// `cursor = None` starts from the beginning of the history.
    async fn fetch_page(&self, account: &str, cursor: Option<&str>, limit: u32) -> Result<Page>;

    /// Like `fetch_page`, but only history at or after `from_height`
    /// (a block number) when given. Sources without block heights ignore it.
    async fn fetch_page_from(
        &self,
        account: &str,
        cursor: Option<&str>,
        limit: u32,
        from_height: Option<u64>,
    ) -> Result<Page> {
        let _ = from_height;
        self.fetch_page(account, cursor, limit).await
    }

    /// Current chain head, if the source has a notion of one
    async fn current_height(&self) -> Result<Option<u64>> {
        Ok(None)
    }

    /// Fetch the operations of a single transaction
    async fn fetch_operations(&self, transaction_id: &str) -> Result<Vec<OperationRecord>>;

    /// Label reported for amounts with no explicit asset code
    fn native_asset(&self) -> &str;
}

/// Build the HTTP client shared by the explorer sources
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Send a request and decode a JSON body, classifying failures
pub(crate) async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T> {
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    debug!("Explorer responded {} for {}", status, response.url());

    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(Error::upstream(status.as_u16(), body));
    }

    serde_json::from_str(&body)
        .map_err(|e| Error::upstream(status.as_u16(), format!("Malformed response body: {}", e)))
}

/// A 2xx response whose records do not have the expected shape
pub(crate) fn malformed(err: serde_json::Error) -> Error {
    Error::upstream(200, format!("Malformed record: {}", err))
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Network(format!("Request timed out: {}", err))
    } else if err.is_decode() {
        Error::upstream(
            err.status().map(|s| s.as_u16()).unwrap_or_default(),
            err.to_string(),
        )
    } else {
        Error::Network(err.to_string())
    }
}
