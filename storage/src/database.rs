//! Connection pools

use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Pool configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Connection URL of the primary
    pub url: String,

    /// Max connections per pool
    pub max_connections: u32,

    /// Min idle connections per pool
    pub min_connections: u32,

    /// Acquire timeout
    pub acquire_timeout: Duration,

    /// Idle connection reap timeout
    pub idle_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/sengine".to_string(),
            max_connections: 20,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Writer and reader pools over the same primary.
///
/// The split is organizational: batch reads (pre-queue selects, webhook
/// matching) go through the reader pool so they never queue behind the
/// dispatcher's writes.
pub struct Database {
    writer: PgPool,
    reader: PgPool,
}

impl Database {
    /// Connect both pools
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let writer = Self::build_pool(config).await?;
        let reader = Self::build_pool(config).await?;

        info!(
            "✅ Database pools ready ({}–{} connections each)",
            config.min_connections, config.max_connections
        );

        Ok(Self { writer, reader })
    }

    async fn build_pool(config: &StorageConfig) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&config.url)
            .await?;

        Ok(pool)
    }

    /// Writer pool
    pub fn writer(&self) -> &PgPool {
        &self.writer
    }

    /// Reader pool
    pub fn reader(&self) -> &PgPool {
        &self.reader
    }

    /// Run pending migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.writer)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    /// Liveness probe
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.reader).await?;
        Ok(())
    }

    /// Close both pools
    pub async fn close(&self) {
        self.writer.close().await;
        self.reader.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.acquire_timeout, Duration::from_secs(60));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
    }
}
