//! Webhook subscription and delivery-log queries

use crate::models::Webhook;
use crate::{Database, Result};

impl Database {
    /// Active subscriptions for a user/workspace listening to an event tag
    pub async fn active_webhooks_for_event(
        &self,
        user_id: i64,
        workspace_id: i64,
        event: &str,
    ) -> Result<Vec<Webhook>> {
        let rows = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT * FROM webhooks
            WHERE user_id = $1 AND workspace_id = $2
              AND status = 'active' AND $3 = ANY(events)
            "#,
        )
        .bind(user_id)
        .bind(workspace_id)
        .bind(event)
        .fetch_all(self.reader())
        .await?;

        Ok(rows)
    }

    /// Insert a pending delivery row, returning its id
    pub async fn insert_webhook_delivery(
        &self,
        webhook_id: i64,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO webhook_deliveries (webhook_id, event_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(webhook_id)
        .bind(event_id)
        .bind(event_type)
        .bind(payload)
        .fetch_one(self.writer())
        .await?;

        Ok(id)
    }

    /// Record the outcome of one delivery attempt
    pub async fn record_delivery_attempt(
        &self,
        delivery_id: i64,
        status: &str,
        response_status: Option<i32>,
        response_body: Option<&str>,
        error_message: Option<&str>,
        duration_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = $1, response_status = $2, response_body = $3,
                error_message = $4, duration_ms = $5, attempted_at = now()
            WHERE id = $6
            "#,
        )
        .bind(status)
        .bind(response_status)
        .bind(response_body)
        .bind(error_message)
        .bind(duration_ms)
        .bind(delivery_id)
        .execute(self.writer())
        .await?;

        Ok(())
    }

    /// Successful delivery resets the failure streak
    pub async fn mark_webhook_success(&self, webhook_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhooks
            SET failure_count = 0, last_triggered_at = now()
            WHERE id = $1
            "#,
        )
        .bind(webhook_id)
        .execute(self.writer())
        .await?;

        Ok(())
    }

    /// Failed delivery extends the failure streak
    pub async fn mark_webhook_failure(&self, webhook_id: i64) -> Result<()> {
        sqlx::query("UPDATE webhooks SET failure_count = failure_count + 1 WHERE id = $1")
            .bind(webhook_id)
            .execute(self.writer())
            .await?;

        Ok(())
    }
}
