//! Payment Watcher
//!
//! Watches a public ledger's history, through a block-explorer HTTP API, for
//! a payment carrying an expected memo or value.
//!
//! ## Architecture
//!
//! **Components:**
//! - `source`: the `LedgerSource` fetch contract
//! - `horizon` / `etherscan`: explorer-backed sources
//! - `mock_ledger`: in-memory source for development and testing
//! - `collector`: follows pagination cursors through an account's history
//! - `matcher`: filters history by a `MatchPredicate`
//! - `resolver`: derives amounts from a matched transaction's operations
//! - `watcher`: the polling state machine and its handles
//! - `registry`: live watches addressable by id
//!
//! **Data Flow:**
//! 1. A caller starts a watch for an account and predicate
//! 2. Every poll, the collector fetches the full history
//! 3. The matcher picks the first matching transaction
//! 4. The resolver fetches its amounts and the watch succeeds
//! 5. Otherwise the watch ends at its deadline or on cancellation

pub mod collector;
pub mod etherscan;
pub mod horizon;
pub mod matcher;
pub mod mock_ledger;
pub mod registry;
pub mod resolver;
pub mod source;
pub mod watcher;

// Re-export commonly used types
pub use collector::HistoryCollector;
pub use etherscan::EtherscanSource;
pub use horizon::HorizonSource;
pub use matcher::match_transactions;
pub use mock_ledger::MockLedger;
pub use registry::WatchRegistry;
pub use resolver::AmountResolver;
pub use source::LedgerSource;
pub use watch_common::{
    Error, MatchPredicate, MemoType, OperationRecord, Page, PaymentAmount, Result,
    TransactionRecord,
};
pub use watcher::{PaymentWatcher, WatchHandle, WatchOutcome, WatchRequest, WatchStatus};
