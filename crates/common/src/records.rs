//! Ledger records as seen by the watcher
//!
//! Sources translate their own wire format into these types. Records are
//! read-only once fetched.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Memo attached to a transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemoType {
    #[default]
    None,
    Text,
    Id,
    Hash,
    Return,
    /// Any memo type this crate does not know about
    Other,
}

impl MemoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoType::None => "none",
            MemoType::Text => "text",
            MemoType::Id => "id",
            MemoType::Hash => "hash",
            MemoType::Return => "return",
            MemoType::Other => "other",
        }
    }
}

impl From<String> for MemoType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "none" | "" => MemoType::None,
            "text" => MemoType::Text,
            "id" => MemoType::Id,
            "hash" => MemoType::Hash,
            "return" => MemoType::Return,
            _ => MemoType::Other,
        }
    }
}

impl From<MemoType> for String {
    fn from(value: MemoType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for MemoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction in an account's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction identifier (Horizon id, or the tx hash on EVM explorers)
    pub id: String,

    #[serde(default)]
    pub memo_type: MemoType,

    #[serde(default)]
    pub memo: Option<String>,

    /// Destination address, when the explorer reports one per transaction
    #[serde(default)]
    pub to: Option<String>,

    /// Transferred value as a decimal string, in the ledger's base unit
    #[serde(default)]
    pub value: Option<String>,

    /// The record exactly as the explorer returned it
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl TransactionRecord {
    /// Create a record with no memo, destination or value
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            memo_type: MemoType::None,
            memo: None,
            to: None,
            value: None,
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_memo(mut self, memo_type: MemoType, memo: impl Into<String>) -> Self {
        self.memo_type = memo_type;
        self.memo = Some(memo.into());
        self
    }

    pub fn with_transfer(mut self, to: impl Into<String>, value: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self.value = Some(value.into());
        self
    }
}

/// One operation inside a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub transaction_id: String,

    #[serde(default)]
    pub amount: Option<String>,

    /// Absent for the ledger's native asset
    #[serde(default)]
    pub asset_code: Option<String>,
}

/// Amount and asset moved by a matched transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAmount {
    pub amount: String,
    pub asset: String,
}

/// One page of account history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<TransactionRecord>,

    /// Continuation token; `None` means there are no more pages
    pub next_cursor: Option<String>,
}

impl Page {
    pub fn new(records: Vec<TransactionRecord>, next_cursor: Option<String>) -> Self {
        Self {
            records,
            next_cursor,
        }
    }

    /// The terminal empty page
    pub fn empty() -> Self {
        Self::default()
    }
}
