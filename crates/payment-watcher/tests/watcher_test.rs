//! State machine tests for the payment watcher
//!
//! Run on a paused tokio clock so polling intervals and deadlines elapse
//! instantly and deterministically.

use async_trait::async_trait;
use payment_watcher::{
    LedgerSource, MatchPredicate, MemoType, MockLedger, OperationRecord, Page, PaymentAmount,
    PaymentWatcher, Result, TransactionRecord, WatchRequest, WatchStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn memo_request(memo: &str) -> WatchRequest {
    WatchRequest::new("GDESTINATION", MatchPredicate::exact_memo(memo))
        .with_poll_interval(Duration::from_secs(5))
        .with_max_duration(Duration::from_secs(60))
}

fn memo_record(id: &str, memo: &str) -> TransactionRecord {
    TransactionRecord::new(id).with_memo(MemoType::Text, memo)
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_on_first_poll() {
    let ledger = Arc::new(MockLedger::new());
    ledger.push_record(memo_record("tx-1", "efbf776c")).await;
    ledger
        .set_operations(
            "tx-1",
            vec![OperationRecord {
                transaction_id: "tx-1".to_string(),
                amount: Some("30.0000000".to_string()),
                asset_code: None,
            }],
        )
        .await;

    let watcher = PaymentWatcher::new(ledger.clone());
    let outcome = watcher.start(memo_request("efbf776c")).result().await;

    assert_eq!(outcome.status, WatchStatus::Succeeded);
    assert_eq!(outcome.transaction.unwrap().id, "tx-1");
    assert_eq!(
        outcome.amounts,
        vec![PaymentAmount {
            amount: "30.0000000".to_string(),
            asset: "XLM".to_string()
        }]
    );
    assert_eq!(outcome.polls, 1);
    assert_eq!(ledger.page_calls(), 1);
    assert_eq!(ledger.operation_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_takes_first_match_in_history_order() {
    let ledger = Arc::new(MockLedger::new());
    ledger.push_record(memo_record("tx-0", "other")).await;
    ledger.push_record(memo_record("tx-1", "efbf776c")).await;
    ledger.push_record(memo_record("tx-2", "efbf776c")).await;

    let watcher = PaymentWatcher::new(ledger.clone());
    let outcome = watcher.start(memo_request("efbf776c")).result().await;

    assert_eq!(outcome.transaction.unwrap().id, "tx-1");
}

#[tokio::test(start_paused = true)]
async fn test_payment_arriving_later_is_found() {
    let ledger = Arc::new(MockLedger::new());
    let watcher = PaymentWatcher::new(ledger.clone());
    let handle = watcher.start(memo_request("efbf776c"));

    let arrival = {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            ledger.push_record(memo_record("tx-late", "efbf776c")).await;
        })
    };

    let outcome = handle.result().await;
    arrival.await.unwrap();

    assert_eq!(outcome.status, WatchStatus::Succeeded);
    assert_eq!(outcome.transaction.unwrap().id, "tx-late");
    // polls at t=0, 5, 10 and 15
    assert_eq!(outcome.polls, 4);
}

#[tokio::test(start_paused = true)]
async fn test_times_out_without_match() {
    let ledger = Arc::new(MockLedger::new());
    ledger.push_record(memo_record("tx-1", "someone-else")).await;

    let watcher = PaymentWatcher::new(ledger.clone());
    let outcome = watcher.start(memo_request("efbf776c")).result().await;

    assert_eq!(outcome.status, WatchStatus::TimedOut);
    assert!(outcome.transaction.is_none());
    assert!(outcome.amounts.is_empty());
    assert_eq!(
        outcome.message.as_deref(),
        Some("Transaction not found within the time limit.")
    );
    // polls at t=0, 5, ..., 55; the deadline wins at t=60
    assert_eq!(outcome.polls, 12);
    assert_eq!(ledger.page_calls(), 12);
}

#[tokio::test(start_paused = true)]
async fn test_no_work_after_termination() {
    let ledger = Arc::new(MockLedger::new());
    let watcher = PaymentWatcher::new(ledger.clone());
    let handle = watcher.start(memo_request("efbf776c"));

    let outcome = handle.result().await;
    assert_eq!(outcome.status, WatchStatus::TimedOut);
    let calls = ledger.page_calls();

    ledger.push_record(memo_record("tx-1", "efbf776c")).await;
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(ledger.page_calls(), calls);
    assert_eq!(handle.status(), WatchStatus::TimedOut);
    assert!(!handle.cancel());
    assert_eq!(handle.result().await, outcome);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_errors_are_retried() {
    let ledger = Arc::new(MockLedger::new());
    ledger.push_record(memo_record("tx-1", "efbf776c")).await;
    ledger.fail_next_fetches(2);

    let watcher = PaymentWatcher::new(ledger.clone());
    let outcome = watcher.start(memo_request("efbf776c")).result().await;

    assert_eq!(outcome.status, WatchStatus::Succeeded);
    assert_eq!(outcome.polls, 3);
    assert_eq!(ledger.page_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_fetch_errors_end_in_timeout() {
    let ledger = Arc::new(MockLedger::new());
    ledger.fail_next_fetches(usize::MAX);

    let watcher = PaymentWatcher::new(ledger.clone());
    let outcome = watcher.start(memo_request("efbf776c")).result().await;

    assert_eq!(outcome.status, WatchStatus::TimedOut);
    assert!(outcome.transaction.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unresolved_amount_still_succeeds() {
    let ledger = Arc::new(MockLedger::new());
    ledger.push_record(memo_record("tx-1", "efbf776c")).await;
    ledger.fail_operations(true);

    let watcher = PaymentWatcher::new(ledger.clone());
    let outcome = watcher.start(memo_request("efbf776c")).result().await;

    assert_eq!(outcome.status, WatchStatus::Succeeded);
    assert_eq!(outcome.transaction.unwrap().id, "tx-1");
    assert!(outcome.amounts.is_empty());
    assert_eq!(ledger.operation_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exact_value_watch() {
    let ledger = Arc::new(MockLedger::new().with_native_asset("ETH"));
    ledger
        .push_record(TransactionRecord::new("0x01").with_transfer("0xabc", "5"))
        .await;
    ledger
        .push_record(TransactionRecord::new("0x02").with_transfer("0xabc", "100000000000000000"))
        .await;

    let watcher = PaymentWatcher::new(ledger.clone());
    let request = WatchRequest::new(
        "0xABC",
        MatchPredicate::exact_value("100000000000000000", "0xABC"),
    );
    let outcome = watcher.start(request).result().await;

    assert_eq!(outcome.status, WatchStatus::Succeeded);
    assert_eq!(outcome.transaction.unwrap().id, "0x02");
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_max_duration_starts() {
    let ledger = Arc::new(MockLedger::new());
    let watcher = PaymentWatcher::new(ledger.clone());

    let handle = watcher.start(
        WatchRequest::new("GDESTINATION", MatchPredicate::exact_memo("efbf776c"))
            .with_max_duration(Duration::from_secs(u64::MAX)),
    );

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(handle.status(), WatchStatus::Pending);

    assert!(handle.cancel());
    assert_eq!(handle.result().await.status, WatchStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_value_watches_ignore_earlier_payments() {
    let ledger = Arc::new(MockLedger::new().with_native_asset("ETH"));
    let watcher = PaymentWatcher::new(ledger.clone());
    let value_request = |from_height| {
        WatchRequest::new("0xabc", MatchPredicate::exact_value("100", "0xabc"))
            .with_from_height(from_height)
    };

    let first = watcher.start(value_request(watcher.current_height().await.unwrap()));
    ledger
        .push_record(TransactionRecord::new("0x01").with_transfer("0xabc", "100"))
        .await;
    let first = first.result().await;
    assert_eq!(first.status, WatchStatus::Succeeded);
    assert_eq!(first.transaction.unwrap().id, "0x01");

    // Same value and destination, started after the first payment was mined
    let second = watcher.start(value_request(watcher.current_height().await.unwrap()));
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(second.status(), WatchStatus::Pending);

    ledger
        .push_record(TransactionRecord::new("0x02").with_transfer("0xabc", "100"))
        .await;
    let second = second.result().await;
    assert_eq!(second.status, WatchStatus::Succeeded);
    assert_eq!(second.transaction.unwrap().id, "0x02");

    // Without a starting height the old payment still matches
    let unbounded = watcher.start(value_request(None)).result().await;
    assert_eq!(unbounded.transaction.unwrap().id, "0x01");
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_fails_without_polling() {
    let ledger = Arc::new(MockLedger::new());
    let watcher = PaymentWatcher::new(ledger.clone());

    let handle = watcher.start(WatchRequest::new("", MatchPredicate::exact_memo("efbf776c")));

    assert_eq!(handle.status(), WatchStatus::Failed);
    let outcome = handle.result().await;
    assert_eq!(outcome.status, WatchStatus::Failed);
    assert!(outcome.message.unwrap().contains("account"));
    assert_eq!(outcome.polls, 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(ledger.page_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_pending() {
    let ledger = Arc::new(MockLedger::new());
    let watcher = PaymentWatcher::new(ledger.clone());
    let handle = watcher.start(memo_request("efbf776c"));

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(handle.status(), WatchStatus::Pending);
    let calls = ledger.page_calls();
    assert_eq!(calls, 2);

    assert!(handle.cancel());
    assert_eq!(handle.status(), WatchStatus::Cancelled);

    let outcome = handle.result().await;
    assert_eq!(outcome.status, WatchStatus::Cancelled);
    assert!(outcome.transaction.is_none());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(ledger.page_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_all_handles_stops_the_watch() {
    let ledger = Arc::new(MockLedger::new());
    let watcher = PaymentWatcher::new(ledger.clone());
    let handle = watcher.start(memo_request("efbf776c"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    drop(handle);
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(ledger.page_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_independent() {
    let ledger = Arc::new(MockLedger::new());
    let watcher = PaymentWatcher::new(ledger.clone());

    let first = watcher.start(memo_request("first"));
    let second = watcher.start(memo_request("second"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(first.cancel());
    ledger.push_record(memo_record("tx-2", "second")).await;

    let first = first.result().await;
    let second = second.result().await;

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(first.status, WatchStatus::Cancelled);
    assert_eq!(second.status, WatchStatus::Succeeded);
    assert_eq!(second.transaction.unwrap().id, "tx-2");
}

/// Source whose history fetch blocks until released
struct GatedLedger {
    inner: MockLedger,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl LedgerSource for GatedLedger {
    async fn fetch_page(&self, account: &str, cursor: Option<&str>, limit: u32) -> Result<Page> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.fetch_page(account, cursor, limit).await
    }

    async fn fetch_operations(&self, transaction_id: &str) -> Result<Vec<OperationRecord>> {
        self.inner.fetch_operations(transaction_id).await
    }

    fn native_asset(&self) -> &str {
        self.inner.native_asset()
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_in_flight_poll_wins() {
    let inner = MockLedger::new();
    inner.push_record(memo_record("tx-1", "efbf776c")).await;
    let ledger = Arc::new(GatedLedger {
        inner,
        entered: Notify::new(),
        release: Notify::new(),
    });

    let watcher = PaymentWatcher::new(ledger.clone());
    let handle = watcher.start(memo_request("efbf776c"));

    // First poll is now blocked inside the fetch
    ledger.entered.notified().await;
    assert!(handle.cancel());
    ledger.release.notify_one();

    let outcome = handle.result().await;

    assert_eq!(outcome.status, WatchStatus::Cancelled);
    assert!(outcome.transaction.is_none());
    assert_eq!(outcome.polls, 1);
    assert_eq!(ledger.inner.page_calls(), 1);
    assert_eq!(ledger.inner.operation_calls(), 0);
}
