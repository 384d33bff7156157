//! Live watches addressable by id
//!
//! Callers that cannot hold on to a `WatchHandle` (HTTP clients, for one)
//! refer to a watch by its session id. An entry is dropped once its outcome
//! has been handed out, or once it has been finished for longer than the
//! retention window, whichever comes first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::watcher::{PaymentWatcher, WatchHandle, WatchOutcome, WatchRequest, WatchStatus};

/// How long a finished watch stays addressable if nobody collects its result
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);

type Sessions = Arc<RwLock<HashMap<Uuid, WatchHandle>>>;

/// Registry of watch sessions
pub struct WatchRegistry {
    watcher: PaymentWatcher,
    sessions: Sessions,
    retention: Duration,
}

impl WatchRegistry {
    pub fn new(watcher: PaymentWatcher) -> Self {
        Self::with_retention(watcher, DEFAULT_RETENTION)
    }

    pub fn with_retention(watcher: PaymentWatcher, retention: Duration) -> Self {
        Self {
            watcher,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    pub fn watcher(&self) -> &PaymentWatcher {
        &self.watcher
    }

    /// Start a watch and remember its handle until it is collected or expires
    pub async fn start(&self, request: WatchRequest) -> WatchHandle {
        let handle = self.watcher.start(request);
        self.sessions
            .write()
            .await
            .insert(handle.id(), handle.clone());
        debug!("Registered watch {}", handle.id());

        tokio::spawn(evict_after_retention(
            Arc::clone(&self.sessions),
            handle.clone(),
            self.retention,
        ));

        handle
    }

    pub async fn get(&self, id: &Uuid) -> Option<WatchHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn status(&self, id: &Uuid) -> Option<WatchStatus> {
        self.get(id).await.map(|handle| handle.status())
    }

    /// Request cancellation; `None` if the id is unknown
    pub async fn cancel(&self, id: &Uuid) -> Option<bool> {
        self.get(id).await.map(|handle| handle.cancel())
    }

    /// Wait for the outcome, then forget the session
    pub async fn result(&self, id: &Uuid) -> Option<WatchOutcome> {
        let handle = self.get(id).await?;
        let outcome = handle.result().await;
        self.sessions.write().await.remove(id);
        debug!("Delivered outcome of watch {}", id);
        Some(outcome)
    }

    /// Number of sessions not yet delivered
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Forget a session `retention` after it finishes
async fn evict_after_retention(sessions: Sessions, handle: WatchHandle, retention: Duration) {
    handle.result().await;
    tokio::time::sleep(retention).await;

    if sessions.write().await.remove(&handle.id()).is_some() {
        debug!("Evicted uncollected watch {}", handle.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_ledger::MockLedger;
    use watch_common::{MatchPredicate, MemoType, TransactionRecord};

    fn registry(ledger: Arc<MockLedger>) -> WatchRegistry {
        WatchRegistry::new(PaymentWatcher::new(ledger))
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_removes_session() {
        let ledger = Arc::new(MockLedger::new());
        ledger
            .push_record(TransactionRecord::new("tx-1").with_memo(MemoType::Text, "abc"))
            .await;
        let registry = registry(ledger);

        let handle = registry
            .start(WatchRequest::new("GABC", MatchPredicate::exact_memo("abc")))
            .await;
        assert_eq!(registry.len().await, 1);

        let outcome = registry.result(&handle.id()).await.unwrap();
        assert_eq!(outcome.status, WatchStatus::Succeeded);
        assert!(registry.is_empty().await);
        assert!(registry.result(&handle.id()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_by_id() {
        let registry = registry(Arc::new(MockLedger::new()));
        let handle = registry
            .start(
                WatchRequest::new("GABC", MatchPredicate::exact_memo("abc"))
                    .with_max_duration(Duration::from_secs(600)),
            )
            .await;

        assert_eq!(registry.cancel(&handle.id()).await, Some(true));
        assert_eq!(registry.status(&handle.id()).await, Some(WatchStatus::Cancelled));

        let outcome = registry.result(&handle.id()).await.unwrap();
        assert_eq!(outcome.status, WatchStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncollected_sessions_expire() {
        let registry = registry(Arc::new(MockLedger::new()));
        let handle = registry
            .start(
                WatchRequest::new("GABC", MatchPredicate::exact_memo("abc"))
                    .with_max_duration(Duration::from_secs(10)),
            )
            .await;

        // Finished, but still inside the retention window
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(registry.status(&handle.id()).await, Some(WatchStatus::TimedOut));

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(registry.status(&handle.id()).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_sessions_are_kept() {
        let registry = WatchRegistry::with_retention(
            PaymentWatcher::new(Arc::new(MockLedger::new())),
            Duration::from_secs(1),
        );
        let handle = registry
            .start(
                WatchRequest::new("GABC", MatchPredicate::exact_memo("abc"))
                    .with_max_duration(Duration::from_secs(600)),
            )
            .await;

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(registry.status(&handle.id()).await, Some(WatchStatus::Pending));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let registry = registry(Arc::new(MockLedger::new()));
        let id = Uuid::new_v4();

        assert!(registry.status(&id).await.is_none());
        assert!(registry.cancel(&id).await.is_none());
        assert!(registry.result(&id).await.is_none());
    }
}
