//! Amount resolution for matched transactions

use std::sync::Arc;
use tracing::debug;
use watch_common::{OperationRecord, PaymentAmount, Result};

use crate::source::LedgerSource;

/// Derives transferred amounts from a transaction's operations
pub struct AmountResolver {
    source: Arc<dyn LedgerSource>,
}

impl AmountResolver {
    pub fn new(source: Arc<dyn LedgerSource>) -> Self {
        Self { source }
    }

    /// Amounts moved by `transaction_id`, in operation order
    pub async fn resolve(&self, transaction_id: &str) -> Result<Vec<PaymentAmount>> {
        let operations = self.source.fetch_operations(transaction_id).await?;

        if operations.is_empty() {
            debug!("No operations found for transaction {}", transaction_id);
        }

        Ok(amounts_from_operations(
            operations,
            self.source.native_asset(),
        ))
    }
}

/// Keep operations that carry an amount; a missing asset code means the native asset
pub fn amounts_from_operations(
    operations: Vec<OperationRecord>,
    native_asset: &str,
) -> Vec<PaymentAmount> {
    operations
        .into_iter()
        .filter_map(|op| {
            let amount = op.amount.filter(|amount| !amount.is_empty())?;
            Some(PaymentAmount {
                amount,
                asset: op
                    .asset_code
                    .filter(|code| !code.is_empty())
                    .unwrap_or_else(|| native_asset.to_string()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_ledger::MockLedger;

    fn op(amount: Option<&str>, asset_code: Option<&str>) -> OperationRecord {
        OperationRecord {
            transaction_id: "tx".to_string(),
            amount: amount.map(str::to_string),
            asset_code: asset_code.map(str::to_string),
        }
    }

    #[test]
    fn test_amounts_skip_operations_without_amount() {
        let amounts = amounts_from_operations(
            vec![op(None, None), op(Some("30.0000000"), None), op(Some("12.5"), Some("USDC"))],
            "XLM",
        );

        assert_eq!(
            amounts,
            vec![
                PaymentAmount {
                    amount: "30.0000000".to_string(),
                    asset: "XLM".to_string()
                },
                PaymentAmount {
                    amount: "12.5".to_string(),
                    asset: "USDC".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_resolve_uses_source_native_asset() {
        let ledger = Arc::new(MockLedger::new().with_native_asset("ETH"));
        ledger
            .set_operations("0xdead", vec![op(Some("100000000000000000"), None)])
            .await;

        let resolver = AmountResolver::new(ledger.clone());
        let amounts = resolver.resolve("0xdead").await.unwrap();

        assert_eq!(amounts.len(), 1);
        assert_eq!(amounts[0].asset, "ETH");
        assert_eq!(ledger.operation_calls(), 1);
    }

    #[tokio::test]
    async fn test_resolve_propagates_failure() {
        let ledger = Arc::new(MockLedger::new());
        ledger.fail_operations(true);

        let resolver = AmountResolver::new(ledger);
        assert!(resolver.resolve("tx").await.is_err());
    }
}
