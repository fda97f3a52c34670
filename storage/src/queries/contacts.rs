//! Contact and opt-out list queries

use crate::models::Contact;
use crate::{Database, Result};

impl Database {
    /// Read a contact by id
    pub async fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.reader())
            .await?;

        Ok(row)
    }

    /// Find a live contact by digits-only phone match
    pub async fn find_contact_by_phone(
        &self,
        user_id: i64,
        workspace_id: i64,
        digits: &str,
    ) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<_, Contact>(
            r#"
            SELECT * FROM contacts
            WHERE user_id = $1 AND workspace_id = $2 AND deleted_at IS NULL
              AND RIGHT(regexp_replace(phone, '[^0-9]', '', 'g'), 10) = RIGHT($3, 10)
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(workspace_id)
        .bind(digits)
        .fetch_optional(self.reader())
        .await?;

        Ok(row)
    }

    /// Create a contact for an unknown inbound sender
    pub async fn create_contact(
        &self,
        user_id: i64,
        workspace_id: i64,
        phone: &str,
    ) -> Result<Contact> {
        let row = sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (user_id, workspace_id, phone, open_chat)
            VALUES ($1, $2, $3, TRUE)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(workspace_id)
        .bind(phone)
        .fetch_one(self.writer())
        .await?;

        Ok(row)
    }

    /// Flip the opt-out flag
    pub async fn set_contact_opted_out(&self, id: i64, opted_out: bool) -> Result<()> {
        sqlx::query("UPDATE contacts SET opted_out = $1 WHERE id = $2")
            .bind(opted_out)
            .bind(id)
            .execute(self.writer())
            .await?;

        Ok(())
    }

    /// Record the latest message preview and reopen the chat thread
    pub async fn touch_contact_last_message(&self, id: i64, preview: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE contacts
            SET last_message = $1, open_chat = TRUE, archive = FALSE
            WHERE id = $2
            "#,
        )
        .bind(preview)
        .bind(id)
        .execute(self.writer())
        .await?;

        Ok(())
    }

    /// Add a deny-list entry; duplicate entries are ignored
    pub async fn add_opt_out(&self, user_id: i64, phone: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO opt_outs (user_id, phone)
            VALUES ($1, $2)
            ON CONFLICT (user_id, phone) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(phone)
        .execute(self.writer())
        .await?;

        Ok(())
    }

    /// Remove a deny-list entry
    pub async fn remove_opt_out(&self, user_id: i64, phone: &str) -> Result<()> {
        sqlx::query("DELETE FROM opt_outs WHERE user_id = $1 AND phone = $2")
            .bind(user_id)
            .bind(phone)
            .execute(self.writer())
            .await?;

        Ok(())
    }

    /// Check deny-list membership
    pub async fn is_opted_out(&self, user_id: i64, phone: &str) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM opt_outs WHERE user_id = $1 AND phone = $2)",
        )
        .bind(user_id)
        .bind(phone)
        .fetch_one(self.reader())
        .await?;

        Ok(exists)
    }

    /// Campaign display name for body personalization
    pub async fn get_campaign_name(&self, id: i64) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT name FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.reader())
            .await?;

        Ok(row.map(|(name,)| name))
    }
}
