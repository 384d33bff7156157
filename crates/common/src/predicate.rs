use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::records::{MemoType, TransactionRecord};

/// How an incoming payment is recognised. Exactly one strategy is active per watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchPredicate {
    /// Text memo equal to `memo`, compared byte for byte
    ExactMemo { memo: String },

    /// Transfer of exactly `value` to `destination` (address case ignored)
    ExactValue { value: String, destination: String },
}

impl MatchPredicate {
    pub fn exact_memo(memo: impl Into<String>) -> Self {
        MatchPredicate::ExactMemo { memo: memo.into() }
    }

    pub fn exact_value(value: impl Into<String>, destination: impl Into<String>) -> Self {
        MatchPredicate::ExactValue {
            value: value.into(),
            destination: destination.into(),
        }
    }

    /// Reject predicates that could never match anything meaningful
    pub fn validate(&self) -> Result<()> {
        match self {
            MatchPredicate::ExactMemo { memo } if memo.is_empty() => {
                Err(Error::Config("memo must not be empty".to_string()))
            }
            MatchPredicate::ExactValue { value, .. } if value.is_empty() => {
                Err(Error::Config("value must not be empty".to_string()))
            }
            MatchPredicate::ExactValue { destination, .. } if destination.is_empty() => {
                Err(Error::Config("destination must not be empty".to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn is_match(&self, record: &TransactionRecord) -> bool {
        match self {
            MatchPredicate::ExactMemo { memo } => {
                record.memo_type == MemoType::Text && record.memo.as_deref() == Some(memo.as_str())
            }
            MatchPredicate::ExactValue { value, destination } => {
                record.value.as_deref() == Some(value.as_str())
                    && record
                        .to
                        .as_deref()
                        .is_some_and(|to| to.eq_ignore_ascii_case(destination))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(MatchPredicate::exact_memo("").validate().is_err());
        assert!(MatchPredicate::exact_value("", "0xabc").validate().is_err());
        assert!(MatchPredicate::exact_value("1", "").validate().is_err());
        assert!(MatchPredicate::exact_memo("efbf776c").validate().is_ok());
    }

    #[test]
    fn test_memo_requires_text_type() {
        let predicate = MatchPredicate::exact_memo("12345");
        let id_memo = TransactionRecord::new("tx").with_memo(MemoType::Id, "12345");
        let text_memo = TransactionRecord::new("tx").with_memo(MemoType::Text, "12345");

        assert!(!predicate.is_match(&id_memo));
        assert!(predicate.is_match(&text_memo));
    }

    #[test]
    fn test_value_requires_destination() {
        let predicate = MatchPredicate::exact_value("100", "0xabc");
        let mut record = TransactionRecord::new("tx");
        record.value = Some("100".to_string());

        assert!(!predicate.is_match(&record));
    }

    #[test]
    fn test_serde_tagging() {
        let predicate: MatchPredicate =
            serde_json::from_str(r#"{"kind":"exact_memo","memo":"abc"}"#).unwrap();
        assert_eq!(predicate, MatchPredicate::exact_memo("abc"));
    }
}
