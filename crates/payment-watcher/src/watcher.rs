//! Payment confirmation watcher
//!
//! Each watch runs as its own tokio task: poll immediately, then every
//! `poll_interval`, until a matching transaction shows up, the deadline
//! passes, or the caller cancels. The outcome is published exactly once.
//!
//! ```text
//! Pending ──match──────▶ Succeeded
//!    │ ────deadline────▶ TimedOut
//!    │ ────cancel──────▶ Cancelled
//! (invalid request) ───▶ Failed   (before any poll)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;
use watch_common::{Error, MatchPredicate, PaymentAmount, Result, TransactionRecord};

use crate::collector::HistoryCollector;
use crate::matcher::{first_match, match_transactions};
use crate::resolver::AmountResolver;
use crate::source::{LedgerSource, DEFAULT_PAGE_SIZE};

/// Default delay between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default overall watch duration
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(60);

const TIMEOUT_MESSAGE: &str = "Transaction not found within the time limit.";

/// Stand-in for durations too large to add to the current instant
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Lifecycle of a watch session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchStatus {
    Pending,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl WatchStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WatchStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::Pending => "pending",
            WatchStatus::Succeeded => "succeeded",
            WatchStatus::Failed => "failed",
            WatchStatus::TimedOut => "timed_out",
            WatchStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a single watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    /// Account whose history is searched
    pub account: String,

    pub predicate: MatchPredicate,

    /// Delay between the start of consecutive polls
    pub poll_interval: Duration,

    /// Give up once this much time has passed without a match
    pub max_duration: Duration,

    /// Ignore history mined before this block height
    pub from_height: Option<u64>,
}

impl WatchRequest {
    pub fn new(account: impl Into<String>, predicate: MatchPredicate) -> Self {
        Self {
            account: account.into(),
            predicate,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_duration: DEFAULT_MAX_DURATION,
            from_height: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn with_from_height(mut self, from_height: Option<u64>) -> Self {
        self.from_height = from_height;
        self
    }

    /// Checks performed before any tick is scheduled
    pub fn validate(&self) -> Result<()> {
        if self.account.trim().is_empty() {
            return Err(Error::Config("account must not be empty".to_string()));
        }

        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be greater than 0".to_string()));
        }

        if self.max_duration.is_zero() {
            return Err(Error::Config("max duration must be greater than 0".to_string()));
        }

        self.predicate.validate()
    }
}

/// Terminal result of a watch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchOutcome {
    pub session_id: Uuid,

    pub status: WatchStatus,

    /// Matched transaction (only when `status` is `Succeeded`)
    pub transaction: Option<TransactionRecord>,

    /// Amounts moved by the matched transaction; empty if they could not be resolved
    pub amounts: Vec<PaymentAmount>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Number of polls performed
    pub polls: u32,
}

/// State owned by the session task
struct WatchSession {
    id: Uuid,
    account: String,
    predicate: MatchPredicate,
    from_height: Option<u64>,
    poll_interval: Duration,
    deadline: Instant,
    status: WatchStatus,
    polls: u32,
}

impl WatchSession {
    fn new(id: Uuid, request: WatchRequest) -> Self {
        let now = Instant::now();
        Self {
            id,
            deadline: now
                .checked_add(request.max_duration)
                .unwrap_or_else(|| now + FAR_FUTURE),
            account: request.account,
            predicate: request.predicate,
            from_height: request.from_height,
            poll_interval: request.poll_interval.min(FAR_FUTURE),
            status: WatchStatus::Pending,
            polls: 0,
        }
    }

    /// Leave `Pending`. Must be called at most once.
    fn finish(
        &mut self,
        status: WatchStatus,
        transaction: Option<TransactionRecord>,
        amounts: Vec<PaymentAmount>,
        message: Option<String>,
    ) -> WatchOutcome {
        debug_assert_eq!(self.status, WatchStatus::Pending);
        debug_assert!(status.is_terminal());
        self.status = status;

        info!(
            session_id = %self.id,
            account = %self.account,
            polls = self.polls,
            "Payment watch finished: {}",
            status
        );

        WatchOutcome {
            session_id: self.id,
            status,
            transaction,
            amounts,
            message,
            polls: self.polls,
        }
    }
}

/// Handle to a running (or finished) watch
#[derive(Clone)]
pub struct WatchHandle {
    id: Uuid,
    cancel_tx: Arc<watch::Sender<bool>>,
    outcome_rx: watch::Receiver<Option<WatchOutcome>>,
}

impl WatchHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation. A poll already in flight finishes, but its
    /// result is discarded and no further polls are made.
    ///
    /// Returns `false` if the watch had already finished.
    pub fn cancel(&self) -> bool {
        if self.outcome_rx.borrow().is_some() {
            return false;
        }
        self.cancel_tx.send_replace(true);
        true
    }

    /// Current status without waiting
    pub fn status(&self) -> WatchStatus {
        match self.outcome_rx.borrow().as_ref() {
            Some(outcome) => outcome.status,
            None if *self.cancel_tx.borrow() => WatchStatus::Cancelled,
            None => WatchStatus::Pending,
        }
    }

    /// The outcome, if the watch has finished
    pub fn outcome(&self) -> Option<WatchOutcome> {
        self.outcome_rx.borrow().clone()
    }

    /// Wait for the terminal outcome (returns immediately once finished)
    pub async fn result(&self) -> WatchOutcome {
        if let Some(outcome) = self.outcome() {
            return outcome;
        }

        let mut outcome_rx = self.outcome_rx.clone();
        let published = match outcome_rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        };

        published.unwrap_or_else(|| WatchOutcome {
            session_id: self.id,
            status: WatchStatus::Cancelled,
            transaction: None,
            amounts: Vec::new(),
            message: Some("Watch task ended without an outcome".to_string()),
            polls: 0,
        })
    }
}

struct WatcherInner {
    source: Arc<dyn LedgerSource>,
    collector: HistoryCollector,
    resolver: AmountResolver,
}

/// Starts payment watches against one ledger source
#[derive(Clone)]
pub struct PaymentWatcher {
    inner: Arc<WatcherInner>,
}

impl PaymentWatcher {
    pub fn new(source: Arc<dyn LedgerSource>) -> Self {
        Self::with_page_size(source, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(source: Arc<dyn LedgerSource>, page_size: u32) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                collector: HistoryCollector::with_page_size(Arc::clone(&source), page_size),
                resolver: AmountResolver::new(Arc::clone(&source)),
                source,
            }),
        }
    }

    /// Start watching. Must be called from within a tokio runtime.
    ///
    /// Invalid requests finish immediately as `Failed` without touching the network.
    pub fn start(&self, request: WatchRequest) -> WatchHandle {
        let id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        if let Err(e) = request.validate() {
            warn!(session_id = %id, "Rejected payment watch: {}", e);
            let (_, outcome_rx) = watch::channel(Some(WatchOutcome {
                session_id: id,
                status: WatchStatus::Failed,
                transaction: None,
                amounts: Vec::new(),
                message: Some(e.to_string()),
                polls: 0,
            }));
            return WatchHandle {
                id,
                cancel_tx: Arc::new(cancel_tx),
                outcome_rx,
            };
        }

        let (outcome_tx, outcome_rx) = watch::channel(None);
        let inner = Arc::clone(&self.inner);
        let session = WatchSession::new(id, request);

        tokio::spawn(async move {
            let outcome = inner.run(session, cancel_rx).await;
            outcome_tx.send_replace(Some(outcome));
        });

        WatchHandle {
            id,
            cancel_tx: Arc::new(cancel_tx),
            outcome_rx,
        }
    }

    /// One collect-and-match pass over `account`'s history
    pub async fn find_matches(
        &self,
        account: &str,
        predicate: &MatchPredicate,
    ) -> Result<Vec<TransactionRecord>> {
        let records = self.inner.collector.collect(account).await?;
        Ok(match_transactions(&records, predicate))
    }

    /// Current chain head of the source, for `WatchRequest::with_from_height`
    pub async fn current_height(&self) -> Result<Option<u64>> {
        self.inner.source.current_height().await
    }

    /// Amounts moved by a transaction
    pub async fn resolve_amounts(&self, transaction_id: &str) -> Result<Vec<PaymentAmount>> {
        self.inner.resolver.resolve(transaction_id).await
    }
}

impl WatcherInner {
    async fn run(
        &self,
        mut session: WatchSession,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> WatchOutcome {
        info!(
            session_id = %session.id,
            account = %session.account,
            "Starting payment watch (polling every {:?})",
            session.poll_interval
        );

        let mut ticker = tokio::time::interval(session.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = tokio::time::sleep_until(session.deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                changed = cancel_rx.changed() => {
                    match changed {
                        Ok(()) if *cancel_rx.borrow() => {
                            return session.finish(WatchStatus::Cancelled, None, Vec::new(), None);
                        }
                        Ok(()) => {}
                        // Every handle is gone; nobody is left to receive a result
                        Err(_) => {
                            return session.finish(
                                WatchStatus::Cancelled,
                                None,
                                Vec::new(),
                                Some("All watch handles were dropped".to_string()),
                            );
                        }
                    }
                }

                _ = &mut deadline => {
                    return session.finish(
                        WatchStatus::TimedOut,
                        None,
                        Vec::new(),
                        Some(TIMEOUT_MESSAGE.to_string()),
                    );
                }

                _ = ticker.tick() => {
                    if Instant::now() >= session.deadline {
                        return session.finish(
                            WatchStatus::TimedOut,
                            None,
                            Vec::new(),
                            Some(TIMEOUT_MESSAGE.to_string()),
                        );
                    }

                    let Some(transaction) = self.poll(&mut session).await else {
                        continue;
                    };

                    if *cancel_rx.borrow() {
                        return session.finish(WatchStatus::Cancelled, None, Vec::new(), None);
                    }

                    let amounts = match self.resolver.resolve(&transaction.id).await {
                        Ok(amounts) => amounts,
                        Err(e) => {
                            warn!(
                                session_id = %session.id,
                                "Error fetching operations for transaction {}: {}",
                                transaction.id,
                                e
                            );
                            Vec::new()
                        }
                    };

                    if *cancel_rx.borrow() {
                        return session.finish(WatchStatus::Cancelled, None, Vec::new(), None);
                    }

                    info!(
                        session_id = %session.id,
                        "Found matching transaction {}",
                        transaction.id
                    );
                    return session.finish(WatchStatus::Succeeded, Some(transaction), amounts, None);
                }
            }
        }
    }

    /// Collect and match once. Fetch errors are logged and treated as "not yet".
    async fn poll(&self, session: &mut WatchSession) -> Option<TransactionRecord> {
        session.polls += 1;

        match self
            .collector
            .collect_from(&session.account, session.from_height)
            .await
        {
            Ok(records) => {
                let found = first_match(&records, &session.predicate).cloned();
                if found.is_none() {
                    debug!(
                        session_id = %session.id,
                        "No matching transaction in {} records (poll {})",
                        records.len(),
                        session.polls
                    );
                }
                found
            }
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    transient = e.is_transient(),
                    "Error checking transactions: {}",
                    e
                );
                None
            }
        }
    }
}
