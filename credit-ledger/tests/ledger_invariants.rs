//! Ledger invariant tests against a local database.
//!
//! Ignored by default; run with a disposable PostgreSQL instance:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/sengine_test cargo test -- --ignored
//! ```

use credit_ledger::{CreditLedger, LedgerError};
use rust_decimal::Decimal;
use std::sync::Arc;
use storage::{Database, StorageConfig};

async fn test_db() -> Arc<Database> {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/sengine_test".to_string());

    let db = Arc::new(
        Database::connect(&StorageConfig {
            url,
            ..Default::default()
        })
        .await
        .expect("database"),
    );
    db.migrate().await.expect("migrations");
    db
}

async fn seed_user(db: &Database, balance: Decimal) -> i64 {
    let (user_id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (workspace_id, messaging_status) VALUES (1, 'active') RETURNING id",
    )
    .fetch_one(db.writer())
    .await
    .unwrap();

    sqlx::query("INSERT INTO user_credits (user_id, balance) VALUES ($1, $2)")
        .bind(user_id)
        .bind(balance)
        .execute(db.writer())
        .await
        .unwrap();

    user_id
}

async fn transaction_sum(db: &Database, user_id: i64) -> Decimal {
    let (sum,): (Option<Decimal>,) =
        sqlx::query_as("SELECT SUM(amount) FROM credit_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(db.reader())
            .await
            .unwrap();
    sum.unwrap_or(Decimal::ZERO)
}

async fn balance_of(db: &Database, user_id: i64) -> Decimal {
    let (balance,): (Decimal,) =
        sqlx::query_as("SELECT balance FROM user_credits WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(db.reader())
            .await
            .unwrap();
    balance
}

#[tokio::test]
#[ignore = "requires a local postgres"]
async fn transaction_sum_tracks_balance_at_quiescence() {
    let db = test_db().await;
    let ledger = CreditLedger::new(db.clone());
    let user_id = seed_user(&db, Decimal::from(100)).await;
    let initial = balance_of(&db, user_id).await;

    ledger
        .deduct(user_id, Decimal::ONE, "send 1", "drip_sms", 1)
        .await
        .unwrap();
    ledger
        .deduct(user_id, Decimal::ONE, "send 2", "drip_sms", 2)
        .await
        .unwrap();
    ledger
        .refund(user_id, Decimal::ONE, "refund send 2", "drip_sms", 2)
        .await
        .unwrap();

    // Sum of signed transaction amounts equals the net balance movement
    assert_eq!(
        initial + transaction_sum(&db, user_id).await,
        balance_of(&db, user_id).await
    );
    assert_eq!(balance_of(&db, user_id).await, Decimal::from(99));
}

#[tokio::test]
#[ignore = "requires a local postgres"]
async fn deduct_fails_below_balance_and_writes_nothing() {
    let db = test_db().await;
    let ledger = CreditLedger::new(db.clone());
    let user_id = seed_user(&db, Decimal::ONE).await;

    ledger
        .deduct(user_id, Decimal::ONE, "send", "drip_sms", 1)
        .await
        .unwrap();

    let result = ledger
        .deduct(user_id, Decimal::ONE, "overdraft", "drip_sms", 2)
        .await;
    assert!(matches!(
        result,
        Err(LedgerError::InsufficientCredits { .. })
    ));

    // The failed attempt left no audit row and no balance change
    let movements: Vec<(Decimal,)> =
        sqlx::query_as("SELECT amount FROM credit_transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(db.reader())
            .await
            .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(balance_of(&db, user_id).await, Decimal::ZERO);
}

#[tokio::test]
#[ignore = "requires a local postgres"]
async fn refund_never_fails_on_balance() {
    let db = test_db().await;
    let ledger = CreditLedger::new(db.clone());
    let user_id = seed_user(&db, Decimal::ZERO).await;

    let new_balance = ledger
        .refund(user_id, Decimal::from(3), "goodwill", "manual", 0)
        .await
        .unwrap();

    assert_eq!(new_balance, Decimal::from(3));
    assert_eq!(balance_of(&db, user_id).await, Decimal::from(3));
}

#[tokio::test]
#[ignore = "requires a local postgres"]
async fn debit_audit_rows_carry_running_balance() {
    let db = test_db().await;
    let ledger = CreditLedger::new(db.clone());
    let user_id = seed_user(&db, Decimal::from(10)).await;

    ledger
        .deduct(user_id, Decimal::from(4), "send", "drip_sms", 7)
        .await
        .unwrap();
    ledger
        .deduct(user_id, Decimal::from(3), "send", "drip_sms", 8)
        .await
        .unwrap();

    let rows: Vec<(Decimal, Decimal)> = sqlx::query_as(
        "SELECT amount, balance_after FROM credit_transactions WHERE user_id = $1 ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(db.reader())
    .await
    .unwrap();

    assert_eq!(rows[0], (Decimal::from(-4), Decimal::from(6)));
    assert_eq!(rows[1], (Decimal::from(-3), Decimal::from(3)));
}
