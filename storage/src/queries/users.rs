//! User and sending-number queries

use crate::models::{User, UserNumber};
use crate::{Database, Result};

impl Database {
    /// Read a user by id
    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            r#"
            SELECT id, workspace_id, provider_account_id, provider_auth_token,
                   messaging_status
            FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.reader())
        .await?;

        Ok(row)
    }

    /// Fuzzy-match a user's sending number by trailing digits
    pub async fn find_user_number_by_digits(
        &self,
        user_id: i64,
        digits: &str,
    ) -> Result<Option<UserNumber>> {
        let row = sqlx::query_as::<_, UserNumber>(
            r#"
            SELECT * FROM user_numbers
            WHERE user_id = $1 AND status = 'active' AND deleted_at IS NULL
              AND RIGHT(regexp_replace(phone, '[^0-9]', '', 'g'), 10) = RIGHT($2, 10)
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(digits)
        .fetch_optional(self.reader())
        .await?;

        Ok(row)
    }

    /// Resolve the owner of a provisioned number (inbound routing)
    pub async fn find_number_owner(&self, digits: &str) -> Result<Option<UserNumber>> {
        let row = sqlx::query_as::<_, UserNumber>(
            r#"
            SELECT * FROM user_numbers
            WHERE status = 'active' AND deleted_at IS NULL
              AND RIGHT(regexp_replace(phone, '[^0-9]', '', 'g'), 10) = RIGHT($1, 10)
            LIMIT 1
            "#,
        )
        .bind(digits)
        .fetch_optional(self.reader())
        .await?;

        Ok(row)
    }

    /// Any active sending number for a user
    pub async fn active_number_for_user(&self, user_id: i64) -> Result<Option<UserNumber>> {
        let row = sqlx::query_as::<_, UserNumber>(
            r#"
            SELECT * FROM user_numbers
            WHERE user_id = $1 AND status = 'active' AND deleted_at IS NULL
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.reader())
        .await?;

        Ok(row)
    }
}
