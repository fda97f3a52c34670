//! Message table queries

use crate::models::{Direction, Message};
use crate::{Database, Result};

/// Fields for a new outbound message row
#[derive(Debug, Clone)]
pub struct NewOutboundMessage<'a> {
    pub uid: &'a str,
    pub b_ref: &'a str,
    pub provider_message_id: Option<&'a str>,
    pub from_number: &'a str,
    pub to_number: &'a str,
    pub body: &'a str,
    pub media_url: Option<&'a str>,
    pub status: i16,
    pub delivery_status: Option<&'a str>,
    pub is_drip: bool,
    pub drip_id: Option<i64>,
    pub user_id: i64,
    pub workspace_id: i64,
    pub contact_id: i64,
    pub message_type: i16,
    pub is_charged: bool,
}

/// Fields for a new inbound message row
#[derive(Debug, Clone)]
pub struct NewInboundMessage<'a> {
    pub uid: &'a str,
    pub provider_message_id: &'a str,
    pub from_number: &'a str,
    pub to_number: &'a str,
    pub body: &'a str,
    pub media_url: Option<&'a str>,
    pub user_id: i64,
    pub workspace_id: i64,
    pub contact_id: i64,
    pub message_type: i16,
}

impl Database {
    /// Insert an outbound message row.
    ///
    /// The dispatcher calls this in a single statement directly after the
    /// gateway accepts the send, so `provider_message_id` is durable before
    /// any other bookkeeping.
    pub async fn insert_outbound_message(&self, new: NewOutboundMessage<'_>) -> Result<Message> {
        let row = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (
                uid, b_ref, provider_message_id, from_number, to_number, body,
                media_url, status, delivery_status, direction, is_drip, drip_id,
                user_id, workspace_id, contact_id, message_type, is_charged, is_read
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, TRUE)
            RETURNING *
            "#,
        )
        .bind(new.uid)
        .bind(new.b_ref)
        .bind(new.provider_message_id)
        .bind(new.from_number)
        .bind(new.to_number)
        .bind(new.body)
        .bind(new.media_url)
        .bind(new.status)
        .bind(new.delivery_status)
        .bind(Direction::Outbound)
        .bind(new.is_drip)
        .bind(new.drip_id)
        .bind(new.user_id)
        .bind(new.workspace_id)
        .bind(new.contact_id)
        .bind(new.message_type)
        .bind(new.is_charged)
        .fetch_one(self.writer())
        .await?;

        Ok(row)
    }

    /// Insert an inbound message row, unread
    pub async fn insert_inbound_message(&self, new: NewInboundMessage<'_>) -> Result<Message> {
        let row = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (
                uid, provider_message_id, from_number, to_number, body, media_url,
                status, delivery_status, direction, user_id, workspace_id,
                contact_id, message_type, is_read
            )
            VALUES ($1, $2, $3, $4, $5, $6, 2, 'received', $7, $8, $9, $10, $11, FALSE)
            RETURNING *
            "#,
        )
        .bind(new.uid)
        .bind(new.provider_message_id)
        .bind(new.from_number)
        .bind(new.to_number)
        .bind(new.body)
        .bind(new.media_url)
        .bind(Direction::Inbound)
        .bind(new.user_id)
        .bind(new.workspace_id)
        .bind(new.contact_id)
        .bind(new.message_type)
        .fetch_one(self.writer())
        .await?;

        Ok(row)
    }

    /// Read a message by id
    pub async fn get_message(&self, id: i64) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(self.reader())
            .await?;

        Ok(row)
    }

    /// Look up by tracking token, then by provider id.
    ///
    /// Status callbacks may carry either; `b_ref` is preferred because it is
    /// minted before the provider id exists.
    pub async fn find_message_for_callback(
        &self,
        b_ref: Option<&str>,
        provider_message_id: &str,
    ) -> Result<Option<Message>> {
        if let Some(b_ref) = b_ref {
            let row = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE b_ref = $1")
                .bind(b_ref)
                .fetch_optional(self.reader())
                .await?;
            if row.is_some() {
                return Ok(row);
            }
        }

        let row = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE provider_message_id = $1",
        )
        .bind(provider_message_id)
        .fetch_optional(self.reader())
        .await?;

        Ok(row)
    }

    /// Update the delivery outcome of a message
    pub async fn update_delivery_status(
        &self,
        id: i64,
        coarse: Option<i16>,
        textual: &str,
    ) -> Result<()> {
        match coarse {
            Some(code) => {
                sqlx::query(
                    r#"
                    UPDATE messages
                    SET status = $1, delivery_status = $2, updated_at = now()
                    WHERE id = $3
                    "#,
                )
                .bind(code)
                .bind(textual)
                .bind(id)
                .execute(self.writer())
                .await?;
            }
            // Unknown provider states propagate as textual only
            None => {
                sqlx::query(
                    "UPDATE messages SET delivery_status = $1, updated_at = now() WHERE id = $2",
                )
                .bind(textual)
                .bind(id)
                .execute(self.writer())
                .await?;
            }
        }

        Ok(())
    }

    /// Record the provider's acceptance of a direct send in one statement
    pub async fn set_message_provider_id(
        &self,
        id: i64,
        provider_message_id: &str,
        status: i16,
        delivery_status: &str,
        is_charged: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET provider_message_id = $1, status = $2, delivery_status = $3,
                is_charged = $4, updated_at = now()
            WHERE id = $5
            "#,
        )
        .bind(provider_message_id)
        .bind(status)
        .bind(delivery_status)
        .bind(is_charged)
        .bind(id)
        .execute(self.writer())
        .await?;

        Ok(())
    }

    /// Mark a direct send failed
    pub async fn mark_message_failed(&self, id: i64, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = 3, delivery_status = 'failed', updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(self.writer())
        .await?;

        tracing::debug!("Message {} marked failed: {}", id, error);
        Ok(())
    }

    /// Unread inbound messages for a user/workspace
    pub async fn unread_count(&self, user_id: i64, workspace_id: i64) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE user_id = $1 AND workspace_id = $2
              AND direction = 'inbound' AND NOT is_read
            "#,
        )
        .bind(user_id)
        .bind(workspace_id)
        .fetch_one(self.reader())
        .await?;

        Ok(count)
    }
}
