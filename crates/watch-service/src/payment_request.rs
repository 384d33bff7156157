//! Payment requests handed to payers
//!
//! A request tells the payer where to send funds and which memo to attach,
//! as plain text and as a wallet URI (suitable for a QR code).

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::LedgerKind;

/// Length of generated memos
pub const MEMO_LEN: usize = 7;

/// Instructions for a single payment
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub memo: String,
    pub destination: String,
    pub amount: String,
    pub uri: String,
    pub payment_message: String,
    pub created_at: DateTime<Utc>,
    /// Chain head when the request was made; pass it back as `from_height`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_height: Option<u64>,
}

impl PaymentRequest {
    /// New request with a fresh memo
    pub fn new(kind: LedgerKind, destination: &str, amount: &str) -> Self {
        Self::with_memo(kind, destination, amount, generate_memo())
    }

    pub fn with_memo(kind: LedgerKind, destination: &str, amount: &str, memo: String) -> Self {
        Self {
            uri: payment_uri(kind, destination, amount, &memo),
            payment_message: format!(
                "Destination: {}\nAmount: {}\nMemo: {}",
                destination, amount, memo
            ),
            memo,
            destination: destination.to_string(),
            amount: amount.to_string(),
            created_at: Utc::now(),
            start_height: None,
        }
    }
}

/// Short random memo: the first hex digits of a v4 uuid
pub fn generate_memo() -> String {
    Uuid::new_v4().simple().to_string()[..MEMO_LEN].to_string()
}

/// Wallet URI for a payment.
///
/// Ethereum wallets are only given the address; the amount is matched on value.
pub fn payment_uri(kind: LedgerKind, destination: &str, amount: &str, memo: &str) -> String {
    match kind {
        LedgerKind::Horizon => format!(
            "web+stellar:pay?destination={}&amount={}&memo={}",
            destination, amount, memo
        ),
        LedgerKind::Etherscan => format!("ethereum:{}", destination),
    }
}
