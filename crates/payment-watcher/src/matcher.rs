//! Transaction matching

use watch_common::{MatchPredicate, TransactionRecord};

/// Records satisfying `predicate`, in their original order
pub fn match_transactions(
    records: &[TransactionRecord],
    predicate: &MatchPredicate,
) -> Vec<TransactionRecord> {
    records
        .iter()
        .filter(|record| predicate.is_match(record))
        .cloned()
        .collect()
}

/// First record satisfying `predicate`
pub fn first_match<'a>(
    records: &'a [TransactionRecord],
    predicate: &MatchPredicate,
) -> Option<&'a TransactionRecord> {
    records.iter().find(|record| predicate.is_match(record))
}
