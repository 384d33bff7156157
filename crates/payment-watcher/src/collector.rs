//! Account history collection
//!
//! Follows continuation cursors from the start of an account's history and
//! returns every record in page order. Each call starts over.

use std::sync::Arc;
use tracing::{debug, warn};
use watch_common::{Result, TransactionRecord};

use crate::source::{LedgerSource, DEFAULT_PAGE_SIZE};

/// History collector
pub struct HistoryCollector {
    source: Arc<dyn LedgerSource>,
    page_size: u32,
}

impl HistoryCollector {
    pub fn new(source: Arc<dyn LedgerSource>) -> Self {
        Self::with_page_size(source, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(source: Arc<dyn LedgerSource>, page_size: u32) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Collect the full history of `account`.
    ///
    /// Any page failure fails the whole collection; records gathered so far
    /// are discarded.
    pub async fn collect(&self, account: &str) -> Result<Vec<TransactionRecord>> {
        self.collect_from(account, None).await
    }

    /// Collect history at or after block `from_height` (the whole history when `None`)
    pub async fn collect_from(
        &self,
        account: &str,
        from_height: Option<u64>,
    ) -> Result<Vec<TransactionRecord>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .source
                .fetch_page_from(account, cursor.as_deref(), self.page_size, from_height)
                .await?;
            pages += 1;

            if page.records.is_empty() {
                if let Some(cursor) = &cursor {
                    warn!("No transactions found for cursor: {}", cursor);
                    break;
                }
            }

            records.extend(page.records);

            match page.next_cursor {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    warn!("Cursor {} did not advance, stopping pagination", next);
                    break;
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(
            "Collected {} transactions for {} across {} page(s)",
            records.len(),
            account,
            pages
        );

        Ok(records)
    }
}
