//! Transactional debit and refund operations

use crate::{
    types::{DebitOutcome, TransactionType},
    LedgerError, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use storage::Database;
use tracing::{debug, info};

/// Credit ledger over the writer pool
pub struct CreditLedger {
    db: Arc<Database>,
}

impl CreditLedger {
    /// Create a ledger bound to the shared database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Non-transactional balance check.
    ///
    /// A race between this check and [`deduct`](Self::deduct) is resolved by
    /// the row lock inside the deduction; this read only avoids pointless
    /// gateway work.
    pub async fn has_enough_credits(&self, user_id: i64, amount: Decimal) -> Result<bool> {
        let balance: Option<(Decimal,)> =
            sqlx::query_as("SELECT balance FROM user_credits WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(self.db.reader())
                .await?;

        Ok(balance.map(|(b,)| b >= amount).unwrap_or(false))
    }

    /// Debit a user inside one transaction.
    ///
    /// The balance row is read with a row-level lock; the new balance and the
    /// debit audit row commit together or not at all.
    pub async fn deduct(
        &self,
        user_id: i64,
        amount: Decimal,
        description: &str,
        reference_type: &str,
        reference_id: i64,
    ) -> Result<DebitOutcome> {
        let mut tx = self.db.writer().begin().await?;

        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT balance FROM user_credits WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        let balance = match row {
            Some((balance,)) => balance,
            None => return Err(LedgerError::NoAccount(user_id)),
        };

        if balance < amount {
            // Dropping the transaction rolls back the lock
            return Err(LedgerError::InsufficientCredits {
                required: amount,
                available: balance,
            });
        }

        let new_balance = balance - amount;

        sqlx::query(
            r#"
            UPDATE user_credits
            SET balance = $1, total_spent = total_spent + $2, updated_at = now()
            WHERE user_id = $3
            "#,
        )
        .bind(new_balance)
        .bind(amount)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let (tx_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO credit_transactions
                (user_id, tx_type, amount, balance_after, description,
                 reference_type, reference_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(TransactionType::Debit.as_str())
        .bind(-amount)
        .bind(new_balance)
        .bind(description)
        .bind(reference_type)
        .bind(reference_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            "Debited {} from user {} (balance: {}, tx: {})",
            amount, user_id, new_balance, tx_id
        );

        Ok(DebitOutcome { new_balance, tx_id })
    }

    /// Refund a user; the symmetric credit entry. Never fails on balance.
    pub async fn refund(
        &self,
        user_id: i64,
        amount: Decimal,
        description: &str,
        reference_type: &str,
        reference_id: i64,
    ) -> Result<Decimal> {
        let mut tx = self.db.writer().begin().await?;

        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT balance FROM user_credits WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        let balance = match row {
            Some((balance,)) => balance,
            None => return Err(LedgerError::NoAccount(user_id)),
        };

        let new_balance = balance + amount;

        sqlx::query(
            r#"
            UPDATE user_credits
            SET balance = $1, total_spent = total_spent - $2, updated_at = now()
            WHERE user_id = $3
            "#,
        )
        .bind(new_balance)
        .bind(amount)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO credit_transactions
                (user_id, tx_type, amount, balance_after, description,
                 reference_type, reference_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user_id)
        .bind(TransactionType::Credit.as_str())
        .bind(amount)
        .bind(new_balance)
        .bind(description)
        .bind(reference_type)
        .bind(reference_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Refunded {} to user {} (balance: {}): {}",
            amount, user_id, new_balance, description
        );

        Ok(new_balance)
    }
}
