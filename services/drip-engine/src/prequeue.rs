//! Pre-queue scheduler
//!
//! Drains `scheduled_messages` into the broker at a controlled lead time.
//! The broker is a short-term hand-off, not long-term storage: only rows due
//! within the lead window are promoted, so a broker restart can never lose
//! more than the window's worth of backlog.
//!
//! Exactly one instance may run fleet-wide; duplicating it double-queues.
//! Cycles are strictly sequential within the process, guarded by an
//! in-progress flag.

use crate::metrics::{PREQUEUE_CYCLE_DURATION, PREQUEUE_ROWS_TOTAL};
use chrono::Utc;
use message_bus::{payload::DripSendJob, NatsClient, Publisher, Queue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{models::ScheduledMessage, Database};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Pre-queue tuning
#[derive(Debug, Clone)]
pub struct PreQueueConfig {
    /// Cycle interval
    pub interval: Duration,

    /// Lead window ahead of `scheduled_at`
    pub lead_window: chrono::Duration,

    /// Max rows promoted per cycle
    pub batch_size: i64,
}

impl Default for PreQueueConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            lead_window: chrono::Duration::minutes(15),
            batch_size: 2_000,
        }
    }
}

/// Single-instance scheduler promoting Pending rows to the broker
pub struct PreQueueScheduler {
    db: Arc<Database>,
    client: Arc<NatsClient>,
    publisher: Arc<Publisher>,
    config: PreQueueConfig,
    in_progress: AtomicBool,
}

impl PreQueueScheduler {
    /// Create the scheduler
    pub fn new(
        db: Arc<Database>,
        client: Arc<NatsClient>,
        publisher: Arc<Publisher>,
        config: PreQueueConfig,
    ) -> Self {
        Self {
            db,
            client,
            publisher,
            config,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Run cycles until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "🔄 Pre-queue scheduler started (interval: {:?}, lead: {}m, batch: {})",
            self.config.interval,
            self.config.lead_window.num_minutes(),
            self.config.batch_size
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Pre-queue scheduler stopping");
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        // Strictly sequential: refuse to overlap a running cycle
        if self.in_progress.swap(true, Ordering::SeqCst) {
            warn!("Previous pre-queue cycle still running, skipping");
            return;
        }

        let started = Instant::now();
        if let Err(e) = self.run_cycle().await {
            error!("Pre-queue cycle failed: {}", e);
        }
        PREQUEUE_CYCLE_DURATION.observe(started.elapsed().as_secs_f64());

        self.in_progress.store(false, Ordering::SeqCst);
    }

    /// One promotion cycle.
    ///
    /// Rows whose publish was acked are promoted Pending → Queued in a single
    /// gated update; everything else stays Pending for the next cycle.
    async fn run_cycle(&self) -> anyhow::Result<()> {
        if !self.client.is_connected().await {
            warn!("Broker down, skipping pre-queue cycle");
            return Ok(());
        }

        let due = self
            .db
            .due_scheduled_batch(self.config.lead_window, self.config.batch_size)
            .await?;

        if due.is_empty() {
            debug!("Pre-queue cycle: nothing due");
            return Ok(());
        }

        let selected = due.len();
        let mut published: Vec<i64> = Vec::with_capacity(selected);
        let mut failed = 0usize;

        for row in due {
            let job = build_job(&row);
            let msg_id = format!("scheduled-{}", row.id);

            match self
                .publisher
                .publish(Queue::DripMessages, &job, Some(&msg_id))
                .await
            {
                Ok(()) => published.push(row.id),
                Err(e) => {
                    failed += 1;
                    warn!("Publish failed for scheduled row {}: {}", row.id, e);
                }
            }
        }

        let promoted = self.db.mark_scheduled_queued(&published).await?;

        PREQUEUE_ROWS_TOTAL
            .with_label_values(&["published"])
            .inc_by(published.len() as f64);
        PREQUEUE_ROWS_TOTAL
            .with_label_values(&["publish_failed"])
            .inc_by(failed as f64);

        info!(
            "📤 Pre-queue cycle: {} due, {} published, {} promoted, {} failed",
            selected,
            published.len(),
            promoted,
            failed
        );

        Ok(())
    }
}

fn build_job(row: &ScheduledMessage) -> DripSendJob {
    DripSendJob {
        scheduled_message_id: row.id,
        drip_contact_id: row.drip_contact_id,
        user_id: row.user_id,
        workspace_id: row.workspace_id,
        contact_id: row.contact_id,
        drip_id: row.drip_id,
        campaign_id: row.campaign_id,
        from_number: row.from_number.clone(),
        to_number: row.to_number.clone(),
        sid: None,
        message: row.body.clone(),
        media_url: row.media_url.clone(),
        scheduled_at: row.scheduled_at,
        queued_at: Utc::now(),
        is_load_test: false,
        credit_cost: None,
    }
}
