//! Ledger types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Audit row direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Balance decrease (a send attempt)
    Debit,
    /// Balance increase (a refund or top-up)
    Credit,
}

impl TransactionType {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Debit => "debit",
            TransactionType::Credit => "credit",
        }
    }
}

/// Result of a successful debit
#[derive(Debug, Clone)]
pub struct DebitOutcome {
    /// Balance after the debit
    pub new_balance: Decimal,
    /// Audit row id
    pub tx_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_type_storage_names() {
        assert_eq!(TransactionType::Debit.as_str(), "debit");
        assert_eq!(TransactionType::Credit.as_str(), "credit");
    }
}
