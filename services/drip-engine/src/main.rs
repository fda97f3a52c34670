use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use drip_engine::{
    config::Config,
    dispatcher::DripDispatcher,
    http::{self, AppState},
    ingestor::InboundIngestor,
    prequeue::{PreQueueConfig, PreQueueScheduler},
    ratelimit::TokenBucket,
    reconciler::StatusReconciler,
    send_worker::SendWorker,
    supervisor::{queue_depth_monitor, Supervisor},
};
use credit_ledger::CreditLedger;
use message_bus::{
    client::BusConfig, publisher::PublisherConfig, subscriber::SubscriberConfig, topology,
    JobHandler, NatsClient, Publisher, Queue, Subscriber,
};
use sms_gateway::{Credentials, GatewayClient, GatewayConfig, SmsSender};
use std::sync::Arc;
use std::time::Duration;
use storage::{Database, StorageConfig};
use tracing::{error, info, warn};
use webhooks::{DispatcherConfig, WebhookDispatcher, WebhookProducer};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Invalid configuration");

    info!("🚀 Sengine drip engine starting");

    let db = Arc::new(
        Database::connect(&StorageConfig {
            url: config.database.url.clone(),
            max_connections: config.database.max_connections,
            min_connections: config.database.min_connections,
            ..Default::default()
        })
        .await
        .expect("Failed to connect to database"),
    );
    db.migrate().await.expect("Failed to run migrations");

    let mut supervisor = Supervisor::new();
    let mut broker: Option<Arc<NatsClient>> = None;

    if config.broker.enabled {
        let client = Arc::new(NatsClient::new(BusConfig {
            urls: vec![config.broker.url.clone()],
            ..Default::default()
        }));

        if let Err(e) = client.connect().await {
            error!("❌ Fatal: {}", e);
            std::process::exit(1);
        }

        topology::declare(&client)
            .await
            .expect("Failed to declare broker topology");

        // Small settle delay between topology declaration and consumer start
        tokio::time::sleep(Duration::from_millis(500)).await;

        let publisher = Arc::new(Publisher::new(client.clone(), PublisherConfig::default()));
        let ledger = Arc::new(CreditLedger::new(db.clone()));
        let producer = Arc::new(WebhookProducer::new(db.clone(), publisher.clone()));
        let bucket = TokenBucket::new(
            config.twilio.rate_limit_per_sec,
            config.twilio.rate_limit_burst,
        );
        let gateway: Arc<dyn SmsSender> = Arc::new(GatewayClient::new(GatewayConfig {
            credentials: Credentials {
                account_sid: config.twilio.account_sid.clone(),
                auth_token: config.twilio.auth_token.clone(),
            },
            ..Default::default()
        }));

        let consumer_tag = format!("drip-engine-{}", std::process::id());

        if config.drip.enabled {
            let dispatcher = Arc::new(DripDispatcher::new(
                db.clone(),
                ledger.clone(),
                gateway.clone(),
                producer.clone(),
                bucket.clone(),
                config.twilio.status_callback_url.clone(),
                Duration::from_millis(config.drip.rate_limit_ms),
            ));
            spawn_consumer(
                &mut supervisor,
                client.clone(),
                Queue::DripMessages,
                config.drip.consumer_prefetch,
                &consumer_tag,
                dispatcher,
            );

            let prequeue = Arc::new(PreQueueScheduler::new(
                db.clone(),
                client.clone(),
                publisher.clone(),
                PreQueueConfig {
                    interval: Duration::from_millis(config.drip.pre_queue_interval_ms),
                    lead_window: chrono::Duration::minutes(config.drip.pre_queue_minutes),
                    batch_size: config.drip.pre_queue_batch,
                },
            ));
            let shutdown = supervisor.shutdown_signal();
            supervisor.register_prequeue(tokio::spawn(prequeue.run(shutdown)));
        } else {
            warn!("Drip pipeline disabled");
        }

        if config.message_worker.enabled {
            let send_worker = Arc::new(SendWorker::new(
                db.clone(),
                ledger.clone(),
                gateway.clone(),
                producer.clone(),
                bucket.clone(),
            ));
            spawn_consumer(
                &mut supervisor,
                client.clone(),
                Queue::InboxSend,
                config.message_worker.prefetch,
                &consumer_tag,
                send_worker,
            );
        }

        let reconciler = Arc::new(StatusReconciler::new(db.clone(), producer.clone()));
        spawn_consumer(
            &mut supervisor,
            client.clone(),
            Queue::InboxStatus,
            config.message_worker.prefetch,
            &consumer_tag,
            reconciler,
        );

        let ingestor = Arc::new(InboundIngestor::new(
            db.clone(),
            publisher.clone(),
            producer.clone(),
        ));
        spawn_consumer(
            &mut supervisor,
            client.clone(),
            Queue::InboxInbound,
            config.message_worker.prefetch,
            &consumer_tag,
            ingestor,
        );

        let webhook_dispatcher = Arc::new(WebhookDispatcher::new(
            db.clone(),
            DispatcherConfig::default(),
        ));
        spawn_consumer(
            &mut supervisor,
            client.clone(),
            Queue::InboxWebhook,
            config.message_worker.prefetch,
            &consumer_tag,
            webhook_dispatcher,
        );

        let monitor_shutdown = supervisor.shutdown_signal();
        supervisor.register_monitor(tokio::spawn(queue_depth_monitor(
            client.clone(),
            monitor_shutdown,
        )));

        broker = Some(client);
        info!("✅ All workers started");
    } else {
        warn!("Broker disabled; running without workers");
    }

    let state = web::Data::new(AppState {
        db: db.clone(),
        broker: broker.clone(),
    });

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    info!("Health endpoint listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(http::configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    // SIGINT/SIGTERM landed: stop the pre-queue first, then consumers
    supervisor
        .shutdown(Duration::from_secs(config.shutdown.kill_timeout_secs))
        .await;

    if let Some(client) = broker {
        if let Err(e) = client.disconnect().await {
            warn!("Broker disconnect failed: {}", e);
        }
    }
    db.close().await;

    info!("Shutdown complete");
    Ok(())
}

fn spawn_consumer<H>(
    supervisor: &mut Supervisor,
    client: Arc<NatsClient>,
    queue: Queue,
    prefetch: i64,
    consumer_tag: &str,
    handler: Arc<H>,
) where
    H: JobHandler + 'static,
{
    let subscriber = Subscriber::new(
        client,
        SubscriberConfig {
            prefetch,
            consumer_tag: consumer_tag.to_string(),
            ..Default::default()
        },
        queue,
    );

    let shutdown = supervisor.shutdown_signal();
    let handle = tokio::spawn(async move {
        if let Err(e) = subscriber.run(handler, shutdown).await {
            error!("Consumer for {} exited with error: {}", queue, e);
        }
    });

    supervisor.register_consumer(queue.to_string(), handle);
}
