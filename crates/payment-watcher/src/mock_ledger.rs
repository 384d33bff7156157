//! In-memory ledger source for development and testing
//!
//! Serves scripted history pages keyed by cursor, counts calls, and can be
//! told to fail so retry behaviour can be exercised without a network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;
use watch_common::{Error, OperationRecord, Page, Result, TransactionRecord};

use crate::source::LedgerSource;

/// Mock ledger
pub struct MockLedger {
    /// History pages keyed by the cursor that requests them (`None` = first page)
    pages: Mutex<HashMap<Option<String>, Page>>,

    /// Block height of records added with `push_record`
    record_heights: Mutex<HashMap<String, u64>>,

    /// Current chain head; each pushed record is mined at this height
    height: AtomicU64,

    /// Operations keyed by transaction id
    operations: Mutex<HashMap<String, Vec<OperationRecord>>>,

    /// Number of upcoming history fetches that fail with a network error
    failing_fetches: AtomicUsize,

    /// Cursor whose page always fails with an upstream error
    failing_cursor: Mutex<Option<String>>,

    /// Whether operation lookups fail
    failing_operations: AtomicBool,

    page_calls: AtomicUsize,
    operation_calls: AtomicUsize,
    native_asset: String,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// Create an empty ledger: the first page has no records and no cursor
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            record_heights: Mutex::new(HashMap::new()),
            height: AtomicU64::new(0),
            operations: Mutex::new(HashMap::new()),
            failing_fetches: AtomicUsize::new(0),
            failing_cursor: Mutex::new(None),
            failing_operations: AtomicBool::new(false),
            page_calls: AtomicUsize::new(0),
            operation_calls: AtomicUsize::new(0),
            native_asset: "XLM".to_string(),
        }
    }

    pub fn with_native_asset(mut self, label: impl Into<String>) -> Self {
        self.native_asset = label.into();
        self
    }

    /// Serve `page` when history is requested with `cursor`
    pub async fn set_page(&self, cursor: Option<&str>, page: Page) {
        self.pages
            .lock()
            .await
            .insert(cursor.map(str::to_string), page);
    }

    /// Append a record to the first page (simulates a payment arriving).
    ///
    /// The record is mined at the current height, which then advances by one.
    pub async fn push_record(&self, record: TransactionRecord) {
        let height = self.height.fetch_add(1, Ordering::SeqCst);
        self.record_heights
            .lock()
            .await
            .insert(record.id.clone(), height);

        let mut pages = self.pages.lock().await;
        pages.entry(None).or_default().records.push(record);
    }

    pub fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    pub async fn set_operations(&self, transaction_id: &str, operations: Vec<OperationRecord>) {
        self.operations
            .lock()
            .await
            .insert(transaction_id.to_string(), operations);
    }

    /// Make the next `count` history fetches fail
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Make every request for `cursor`'s page fail
    pub async fn fail_on_cursor(&self, cursor: &str) {
        *self.failing_cursor.lock().await = Some(cursor.to_string());
    }

    pub fn fail_operations(&self, fail: bool) {
        self.failing_operations.store(fail, Ordering::SeqCst);
    }

    /// Total history page requests served (including failures)
    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn operation_calls(&self) -> usize {
        self.operation_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerSource for MockLedger {
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
        self.page_calls.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::Network("mock ledger unavailable".to_string()));
        }

        if cursor.is_some() && self.failing_cursor.lock().await.as_deref() == cursor {
            return Err(Error::upstream(500, "mock page unavailable"));
        }

        let mut page = self
            .pages
            .lock()
            .await
            .get(&cursor.map(str::to_string))
            .cloned()
            .unwrap_or_else(Page::empty);

        // Records set with `set_page` have no height and are always served
        if let Some(from_height) = from_height {
            let heights = self.record_heights.lock().await;
            page.records.retain(|record| {
                heights
                    .get(&record.id)
                    .map_or(true, |height| *height >= from_height)
            });
        }
        page.records.truncate(limit as usize);

        debug!(
            "Mock ledger: fetch_page({}, {:?}) -> {} records",
            account,
            cursor,
            page.records.len()
        );

        Ok(page)
    }

    async fn current_height(&self) -> Result<Option<u64>> {
        Ok(Some(self.height()))
    }

    async fn fetch_operations(&self, transaction_id: &str) -> Result<Vec<OperationRecord>> {
        self.operation_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_operations.load(Ordering::SeqCst) {
            return Err(Error::upstream(500, "mock operations unavailable"));
        }

        Ok(self
            .operations
            .lock()
            .await
            .get(transaction_id)
            .cloned()
            .unwrap_or_default())
    }

    fn native_asset(&self) -> &str {
        &self.native_asset
    }
}
