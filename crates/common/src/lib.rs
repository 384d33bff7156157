pub mod error;
pub mod predicate;
pub mod records;

pub use error::{Error, Result};
pub use predicate::MatchPredicate;
pub use records::{MemoType, OperationRecord, Page, PaymentAmount, TransactionRecord};
