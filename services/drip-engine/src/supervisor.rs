//! Worker supervision
//!
//! Owns the shutdown signal and every worker task. Shutdown order matters:
//! the pre-queue scheduler stops first (no new promotions), then consumers
//! are cancelled so the broker stops delivering, and in-flight handlers get
//! a bounded grace period before the process exits regardless.

use message_bus::{NatsClient, Queue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Depth above which a queue draws a warning
const DEPTH_WARN_THRESHOLD: u64 = 100;

/// Monitor wake interval
const MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Ticks between full depth-table prints (5 minutes at 30 s)
const TABLE_EVERY_TICKS: u32 = 10;

/// Tracks worker tasks and coordinates graceful shutdown
pub struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    prequeue: Option<JoinHandle<()>>,
    consumers: Vec<(String, JoinHandle<()>)>,
    monitor: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Create a supervisor with a fresh shutdown channel
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            prequeue: None,
            consumers: Vec::new(),
            monitor: None,
        }
    }

    /// Receiver workers watch for the shutdown flip
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Register the single pre-queue task
    pub fn register_prequeue(&mut self, handle: JoinHandle<()>) {
        self.prequeue = Some(handle);
    }

    /// Register a consumer task
    pub fn register_consumer(&mut self, name: impl Into<String>, handle: JoinHandle<()>) {
        self.consumers.push((name.into(), handle));
    }

    /// Register the queue-depth monitor
    pub fn register_monitor(&mut self, handle: JoinHandle<()>) {
        self.monitor = Some(handle);
    }

    /// Stop everything: pre-queue first, then consumers, bounded by
    /// `kill_timeout` per group.
    pub async fn shutdown(mut self, kill_timeout: Duration) {
        info!("Shutting down workers (kill timeout: {:?})", kill_timeout);
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.prequeue.take() {
            if tokio::time::timeout(kill_timeout, handle).await.is_err() {
                warn!("Pre-queue scheduler did not stop in time");
            } else {
                info!("Pre-queue scheduler stopped");
            }
        }

        for (name, handle) in self.consumers.drain(..) {
            match tokio::time::timeout(kill_timeout, handle).await {
                Ok(_) => info!("Consumer {} stopped", name),
                Err(_) => warn!("Consumer {} did not stop within the kill timeout", name),
            }
        }

        if let Some(handle) = self.monitor.take() {
            handle.abort();
        }

        info!("✅ All workers stopped");
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic queue-depth monitor.
///
/// Warns when any queue's pending count crosses the threshold and prints a
/// full table every five minutes.
pub async fn queue_depth_monitor(client: Arc<NatsClient>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(MONITOR_INTERVAL);
    let mut ticks: u32 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                ticks = ticks.wrapping_add(1);

                let depths = match collect_depths(&client).await {
                    Ok(depths) => depths,
                    Err(e) => {
                        debug!("Queue depth probe failed: {}", e);
                        continue;
                    }
                };

                for (queue, depth) in &depths {
                    if *depth > DEPTH_WARN_THRESHOLD {
                        warn!("⚠️  Queue {} depth {} exceeds {}", queue, depth, DEPTH_WARN_THRESHOLD);
                    }
                }

                if ticks % TABLE_EVERY_TICKS == 0 {
                    info!("\n{}", format_depth_table(&depths));
                }
            }
        }
    }
}

async fn collect_depths(client: &NatsClient) -> message_bus::Result<Vec<(Queue, u64)>> {
    let js = client.jetstream().await?;
    let mut depths = Vec::with_capacity(Queue::ALL.len());

    for queue in Queue::ALL {
        let stream = match js.get_stream(queue.stream_name()).await {
            Ok(stream) => stream,
            Err(_) => continue,
        };

        // A consumer that has not been declared yet simply reads as empty
        let pending = match stream
            .get_consumer::<async_nats::jetstream::consumer::pull::Config>(queue.durable_name())
            .await
        {
            Ok(mut consumer) => consumer.info().await.map(|info| info.num_pending).unwrap_or(0),
            Err(_) => 0,
        };

        depths.push((queue, pending));
    }

    Ok(depths)
}

fn format_depth_table(depths: &[(Queue, u64)]) -> String {
    let mut table = String::from("Queue depths:\n  queue            pending\n");
    for (queue, depth) in depths {
        table.push_str(&format!("  {:<16} {}\n", queue.to_string(), depth));
    }
    table
}
