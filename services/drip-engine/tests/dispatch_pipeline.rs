//! Dispatcher pipeline tests against a local database.
//!
//! These exercise the full ordered send pipeline with a mock gateway. They
//! need a PostgreSQL instance (DATABASE_URL) and are ignored by default:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/sengine_test cargo test -- --ignored
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use credit_ledger::CreditLedger;
use drip_engine::dispatcher::DripDispatcher;
use drip_engine::ratelimit::TokenBucket;
use drip_engine::send_worker::SendWorker;
use message_bus::{client::BusConfig, payload::DripSendJob, Delivery, JobHandler, NatsClient, Publisher};
use rust_decimal::Decimal;
use sms_gateway::{SendRequest, SendResult, SmsSender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storage::{Database, StorageConfig};
use tokio::sync::Mutex;
use webhooks::WebhookProducer;

/// Gateway double that records every request
struct MockGateway {
    calls: AtomicUsize,
    requests: Mutex<Vec<SendRequest>>,
    result: SendResult,
}

impl MockGateway {
    fn succeeding(sid: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            result: SendResult {
                success: true,
                provider_message_id: Some(sid.to_string()),
                status: Some("sent".to_string()),
                segment_count: 1,
                ..Default::default()
            },
        })
    }

    fn failing(code: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            result: SendResult::failure(Some(code.to_string()), message),
        })
    }
}

#[async_trait]
impl SmsSender for MockGateway {
    async fn send(&self, request: SendRequest) -> SendResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request);
        self.result.clone()
    }
}

struct TestEnv {
    db: Arc<Database>,
    gateway: Arc<MockGateway>,
    dispatcher: DripDispatcher,
}

async fn test_env(gateway: Arc<MockGateway>) -> TestEnv {
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

    // The broker client stays disconnected: webhook fan-out is fire-and-forget
    // and only logs when the publish fails
    let client = Arc::new(NatsClient::new(BusConfig::default()));
    let publisher = Arc::new(Publisher::new(client, Default::default()));
    let producer = Arc::new(WebhookProducer::new(db.clone(), publisher));
    let ledger = Arc::new(CreditLedger::new(db.clone()));
    let bucket = TokenBucket::new(100.0, 100.0);

    let dispatcher = DripDispatcher::new(
        db.clone(),
        ledger,
        gateway.clone(),
        producer,
        bucket,
        None,
        Duration::ZERO,
    );

    TestEnv {
        db,
        gateway,
        dispatcher,
    }
}

/// Seed a user, credits, contact, drip enrollment and one scheduled row.
/// Returns (user_id, contact_id, drip_contact_id, scheduled_id).
async fn seed(env: &TestEnv, balance: Decimal, first_name: &str) -> (i64, i64, i64, i64) {
    let pool = env.db.writer();

    let (user_id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (workspace_id, messaging_status) VALUES (1, 'active') RETURNING id",
    )
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query("INSERT INTO user_credits (user_id, balance) VALUES ($1, $2)")
        .bind(user_id)
        .bind(balance)
        .execute(pool)
        .await
        .unwrap();

    sqlx::query("INSERT INTO user_numbers (user_id, phone) VALUES ($1, '+15550001111')")
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();

    let (contact_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO contacts (user_id, workspace_id, first_name, last_name, phone)
        VALUES ($1, 1, $2, 'Lovelace', '+15551112222')
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(first_name)
    .fetch_one(pool)
    .await
    .unwrap();

    let (drip_contact_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO drip_contacts (drip_id, campaign_id, contact_id, user_id)
        VALUES (1, 1, $1, $2)
        RETURNING id
        "#,
    )
    .bind(contact_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
    .unwrap();

    let (scheduled_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO scheduled_messages
            (user_id, workspace_id, contact_id, drip_id, campaign_id,
             drip_contact_id, to_number, body, scheduled_at, status)
        VALUES ($1, 1, $2, 1, 1, $3, '+15551112222', 'hi [first]', $4, 1)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(contact_id)
    .bind(drip_contact_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .unwrap();

    (user_id, contact_id, drip_contact_id, scheduled_id)
}

fn job_for(
    user_id: i64,
    contact_id: i64,
    drip_contact_id: i64,
    scheduled_id: i64,
) -> DripSendJob {
    DripSendJob {
        scheduled_message_id: scheduled_id,
        drip_contact_id,
        user_id,
        workspace_id: 1,
        contact_id,
        drip_id: 1,
        campaign_id: 1,
        from_number: None,
        to_number: "+15551112222".to_string(),
        sid: None,
        message: "hi [first]".to_string(),
        media_url: None,
        scheduled_at: Utc::now(),
        queued_at: Utc::now(),
        is_load_test: false,
        credit_cost: None,
    }
}

fn delivery(job: &DripSendJob) -> Delivery {
    Delivery {
        payload: Bytes::from(serde_json::to_vec(job).unwrap()),
        retry_count: 0,
    }
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
async fn happy_drip_sends_personalized_body_and_charges_once() {
    let env = test_env(MockGateway::succeeding("SM1")).await;
    let (user_id, contact_id, drip_contact_id, scheduled_id) =
        seed(&env, Decimal::from(10), "Ada").await;

    let job = job_for(user_id, contact_id, drip_contact_id, scheduled_id);
    env.dispatcher.handle(delivery(&job)).await.unwrap();

    assert_eq!(env.gateway.calls.load(Ordering::SeqCst), 1);
    let requests = env.gateway.requests.lock().await;
    assert_eq!(requests[0].body, "hi Ada");

    let row = env
        .db
        .get_scheduled_message(scheduled_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, 3); // Sent
    assert_eq!(row.provider_message_id.as_deref(), Some("SM1"));

    let message = env.db.get_message(row.message_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(message.provider_message_id.as_deref(), Some("SM1"));
    assert!(message.is_drip);

    assert_eq!(balance_of(&env.db, user_id).await, Decimal::from(9));

    let (dc_status,): (i16,) =
        sqlx::query_as("SELECT status FROM drip_contacts WHERE id = $1")
            .bind(drip_contact_id)
            .fetch_one(env.db.reader())
            .await
            .unwrap();
    assert_eq!(dc_status, 1); // Sent
}

#[tokio::test]
#[ignore = "requires a local postgres"]
async fn duplicate_delivery_is_a_no_op() {
    let env = test_env(MockGateway::succeeding("SM2")).await;
    let (user_id, contact_id, drip_contact_id, scheduled_id) =
        seed(&env, Decimal::from(10), "Ada").await;

    // First delivery completes the send
    let job = job_for(user_id, contact_id, drip_contact_id, scheduled_id);
    env.dispatcher.handle(delivery(&job)).await.unwrap();
    assert_eq!(env.gateway.calls.load(Ordering::SeqCst), 1);

    // Redelivery of the same payload: no gateway call, no credit movement
    env.dispatcher.handle(delivery(&job)).await.unwrap();
    assert_eq!(env.gateway.calls.load(Ordering::SeqCst), 1);
    assert_eq!(balance_of(&env.db, user_id).await, Decimal::from(9));
}

#[tokio::test]
#[ignore = "requires a local postgres"]
async fn insufficient_credits_fails_without_gateway_call() {
    let env = test_env(MockGateway::succeeding("SM3")).await;
    let (user_id, contact_id, drip_contact_id, scheduled_id) =
        seed(&env, Decimal::ZERO, "Ada").await;

    let job = job_for(user_id, contact_id, drip_contact_id, scheduled_id);
    env.dispatcher.handle(delivery(&job)).await.unwrap();

    assert_eq!(env.gateway.calls.load(Ordering::SeqCst), 0);
    assert_eq!(balance_of(&env.db, user_id).await, Decimal::ZERO);

    let row = env
        .db
        .get_scheduled_message(scheduled_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, 5); // Failed
    assert_eq!(row.error_message.as_deref(), Some("Insufficient credits"));

    let (dc_status, dc_error): (i16, Option<String>) =
        sqlx::query_as("SELECT status, error_message FROM drip_contacts WHERE id = $1")
            .bind(drip_contact_id)
            .fetch_one(env.db.reader())
            .await
            .unwrap();
    assert_eq!(dc_status, 3); // Failed
    assert_eq!(dc_error.as_deref(), Some("Insufficient credits"));
}

#[tokio::test]
#[ignore = "requires a local postgres"]
async fn gateway_failure_refunds_the_debit() {
    let env = test_env(MockGateway::failing("21610", "Unsubscribed recipient")).await;
    let (user_id, contact_id, drip_contact_id, scheduled_id) =
        seed(&env, Decimal::from(5), "Ada").await;

    let job = job_for(user_id, contact_id, drip_contact_id, scheduled_id);
    env.dispatcher.handle(delivery(&job)).await.unwrap();

    assert_eq!(env.gateway.calls.load(Ordering::SeqCst), 1);

    // Debit then refund of equal magnitude, same reference
    let movements: Vec<(String, Decimal, Option<i64>)> = sqlx::query_as(
        r#"
        SELECT tx_type, amount, reference_id FROM credit_transactions
        WHERE user_id = $1 ORDER BY id
        "#,
    )
    .bind(user_id)
    .fetch_all(env.db.reader())
    .await
    .unwrap();

    assert_eq!(movements.len(), 2);
    assert_eq!(movements[0].0, "debit");
    assert_eq!(movements[1].0, "credit");
    assert_eq!(movements[0].1, -movements[1].1);
    assert_eq!(movements[0].2, movements[1].2);

    assert_eq!(balance_of(&env.db, user_id).await, Decimal::from(5));

    let row = env
        .db
        .get_scheduled_message(scheduled_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, 5); // Failed
    assert!(row.error_message.unwrap().contains("21610"));
}

#[tokio::test]
#[ignore = "requires a local postgres"]
async fn direct_send_duplicate_is_a_no_op() {
    let env = test_env(MockGateway::succeeding("SM9")).await;
    let (user_id, contact_id, _, _) = seed(&env, Decimal::from(5), "Ada").await;

    // A message row that already reached the gateway
    let (message_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO messages
            (uid, b_ref, provider_message_id, to_number, body, status,
             delivery_status, direction, user_id, workspace_id, contact_id)
        VALUES ($1, 'DM-dup-000001', 'SMexisting', '+15551112222', 'hi', 1,
                'sent', 'outbound', $2, 1, $3)
        RETURNING id
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(contact_id)
    .fetch_one(env.db.writer())
    .await
    .unwrap();

    let ledger = Arc::new(CreditLedger::new(env.db.clone()));
    let client = Arc::new(NatsClient::new(BusConfig::default()));
    let publisher = Arc::new(Publisher::new(client, Default::default()));
    let producer = Arc::new(WebhookProducer::new(env.db.clone(), publisher));
    let worker = SendWorker::new(
        env.db.clone(),
        ledger,
        env.gateway.clone(),
        producer,
        TokenBucket::new(100.0, 100.0),
    );

    let payload = serde_json::json!({
        "type": "SEND_SMS",
        "retryCount": 0,
        "data": {
            "messageId": message_id,
            "bRef": "DM-dup-000001",
            "fromNumber": "+15550001111",
            "toNumber": "+15551112222",
            "message": "hi",
            "mediaUrl": null,
            "contactId": contact_id,
            "userId": user_id,
            "workspaceId": 1,
            "statusCallbackUrl": null
        }
    });

    worker
        .handle(Delivery {
            payload: Bytes::from(serde_json::to_vec(&payload).unwrap()),
            retry_count: 0,
        })
        .await
        .unwrap();

    assert_eq!(env.gateway.calls.load(Ordering::SeqCst), 0);
    assert_eq!(balance_of(&env.db, user_id).await, Decimal::from(5));
}

#[tokio::test]
#[ignore = "requires a local postgres"]
async fn opted_out_contact_is_skipped_without_charge() {
    let env = test_env(MockGateway::succeeding("SM4")).await;
    let (user_id, contact_id, drip_contact_id, scheduled_id) =
        seed(&env, Decimal::from(5), "Ada").await;

    sqlx::query("UPDATE contacts SET opted_out = TRUE WHERE id = $1")
        .bind(contact_id)
        .execute(env.db.writer())
        .await
        .unwrap();

    let job = job_for(user_id, contact_id, drip_contact_id, scheduled_id);
    env.dispatcher.handle(delivery(&job)).await.unwrap();

    assert_eq!(env.gateway.calls.load(Ordering::SeqCst), 0);
    assert_eq!(balance_of(&env.db, user_id).await, Decimal::from(5));

    let (dc_status,): (i16,) =
        sqlx::query_as("SELECT status FROM drip_contacts WHERE id = $1")
            .bind(drip_contact_id)
            .fetch_one(env.db.reader())
            .await
            .unwrap();
    assert_eq!(dc_status, 4); // Skipped
}
