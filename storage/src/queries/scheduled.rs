//! Scheduled message and drip-contact queries

use crate::models::{DripContactStatus, ScheduledMessage, ScheduledStatus};
use crate::{Database, Result};
use chrono::{Duration, Utc};

impl Database {
    /// Select the batch due within the lead window.
    ///
    /// Only `Pending` rows qualify; a row scheduled exactly now is eligible.
    pub async fn due_scheduled_batch(
        &self,
        lead: Duration,
        limit: i64,
    ) -> Result<Vec<ScheduledMessage>> {
        let horizon = Utc::now() + lead;

        let rows = sqlx::query_as::<_, ScheduledMessage>(
            r#"
            SELECT * FROM scheduled_messages
            WHERE status = $1 AND scheduled_at <= $2
            ORDER BY scheduled_at ASC
            LIMIT $3
            "#,
        )
        .bind(ScheduledStatus::Pending as i16)
        .bind(horizon)
        .bind(limit)
        .fetch_all(self.reader())
        .await?;

        Ok(rows)
    }

    /// Promote published rows from Pending to Queued.
    ///
    /// Gated on `status = Pending` so a row cancelled in parallel is not
    /// clobbered. Returns the number of rows actually promoted.
    pub async fn mark_scheduled_queued(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE scheduled_messages
            SET status = $1, queued_at = now(), updated_at = now()
            WHERE id = ANY($2) AND status = $3
            "#,
        )
        .bind(ScheduledStatus::Queued as i16)
        .bind(ids)
        .bind(ScheduledStatus::Pending as i16)
        .execute(self.writer())
        .await?;

        Ok(result.rows_affected())
    }

    /// Fetch a single scheduled row
    pub async fn get_scheduled_message(&self, id: i64) -> Result<Option<ScheduledMessage>> {
        let row = sqlx::query_as::<_, ScheduledMessage>(
            "SELECT * FROM scheduled_messages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.reader())
        .await?;

        Ok(row)
    }

    /// Mark a scheduled row Sent and link the created message
    pub async fn mark_scheduled_sent(
        &self,
        id: i64,
        message_id: i64,
        provider_message_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_messages
            SET status = $1, sent_at = now(), message_id = $2,
                provider_message_id = $3, updated_at = now()
            WHERE id = $4 AND status IN ($5, $6)
            "#,
        )
        .bind(ScheduledStatus::Sent as i16)
        .bind(message_id)
        .bind(provider_message_id)
        .bind(id)
        .bind(ScheduledStatus::Queued as i16)
        .bind(ScheduledStatus::Sending as i16)
        .execute(self.writer())
        .await?;

        Ok(())
    }

    /// Mark a scheduled row Failed with a reason.
    ///
    /// Failed is reachable from any non-terminal state.
    pub async fn mark_scheduled_failed(&self, id: i64, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_messages
            SET status = $1, error_message = $2, retry_count = retry_count + 1,
                updated_at = now()
            WHERE id = $3 AND status NOT IN ($4, $5, $6)
            "#,
        )
        .bind(ScheduledStatus::Failed as i16)
        .bind(reason)
        .bind(id)
        .bind(ScheduledStatus::Delivered as i16)
        .bind(ScheduledStatus::Failed as i16)
        .bind(ScheduledStatus::Cancelled as i16)
        .execute(self.writer())
        .await?;

        Ok(())
    }

    /// Cancel a scheduled row; only Pending rows can be cancelled
    pub async fn cancel_scheduled(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_messages
            SET status = $1, updated_at = now()
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(ScheduledStatus::Cancelled as i16)
        .bind(id)
        .bind(ScheduledStatus::Pending as i16)
        .execute(self.writer())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark the enrollment row Sent with its tracking token
    pub async fn mark_drip_contact_sent(
        &self,
        id: i64,
        message_id: i64,
        b_ref: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE drip_contacts
            SET status = $1, sent_at = now(), message_id = $2, b_ref = $3
            WHERE id = $4
            "#,
        )
        .bind(DripContactStatus::Sent as i16)
        .bind(message_id)
        .bind(b_ref)
        .bind(id)
        .execute(self.writer())
        .await?;

        Ok(())
    }

    /// Mark the enrollment row Failed with a reason
    pub async fn mark_drip_contact_failed(&self, id: i64, reason: &str) -> Result<()> {
        self.set_drip_contact_outcome(id, DripContactStatus::Failed, reason)
            .await
    }

    /// Mark the enrollment row Skipped (opted-out or blocked contact)
    pub async fn mark_drip_contact_skipped(&self, id: i64, reason: &str) -> Result<()> {
        self.set_drip_contact_outcome(id, DripContactStatus::Skipped, reason)
            .await
    }

    async fn set_drip_contact_outcome(
        &self,
        id: i64,
        status: DripContactStatus,
        reason: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE drip_contacts SET status = $1, error_message = $2 WHERE id = $3",
        )
        .bind(status as i16)
        .bind(reason)
        .bind(id)
        .execute(self.writer())
        .await?;

        Ok(())
    }

    /// Mark a delivered drip outcome once the provider confirms
    pub async fn mark_drip_contact_delivered(&self, message_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE drip_contacts SET status = $1 WHERE message_id = $2 AND status = $3",
        )
        .bind(DripContactStatus::Delivered as i16)
        .bind(message_id)
        .bind(DripContactStatus::Sent as i16)
        .execute(self.writer())
        .await?;

        Ok(())
    }
}
