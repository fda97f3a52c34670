use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub twilio: TwilioConfig,
    pub drip: DripConfig,
    pub message_worker: MessageWorkerConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BrokerConfig {
    pub url: String,
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub status_callback_url: Option<String>,
    /// Token refill rate, per second
    pub rate_limit_per_sec: f64,
    /// Token bucket capacity
    pub rate_limit_burst: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DripConfig {
    /// Whether the drip pipeline (pre-queue + dispatcher) runs in this process
    pub enabled: bool,
    /// Pre-queue cycle interval, milliseconds
    pub pre_queue_interval_ms: u64,
    /// Lead window ahead of `scheduled_at`, minutes
    pub pre_queue_minutes: i64,
    /// Max rows promoted per cycle
    pub pre_queue_batch: i64,
    /// Dispatcher prefetch
    pub consumer_prefetch: i64,
    /// Optional extra delay between sends, milliseconds
    pub rate_limit_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MessageWorkerConfig {
    pub enabled: bool,
    pub prefetch: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ShutdownConfig {
    /// Bound on waiting for in-flight handlers, seconds
    pub kill_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8090)?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 2)?
            .set_default("broker.url", "nats://localhost:4222")?
            .set_default("broker.enabled", true)?
            .set_default("twilio.account_sid", "")?
            .set_default("twilio.auth_token", "")?
            .set_default("twilio.rate_limit_per_sec", 5.0)?
            .set_default("twilio.rate_limit_burst", 10.0)?
            .set_default("drip.enabled", true)?
            .set_default("drip.pre_queue_interval_ms", 30_000)?
            .set_default("drip.pre_queue_minutes", 15)?
            .set_default("drip.pre_queue_batch", 2_000)?
            .set_default("drip.consumer_prefetch", 50)?
            .set_default("drip.rate_limit_ms", 0)?
            .set_default("message_worker.enabled", true)?
            .set_default("message_worker.prefetch", 50)?
            .set_default("shutdown.kill_timeout_secs", 10)?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder
                .add_source(File::with_name(&format!("config/{}", environment)).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("SENGINE")
                .separator("__")
                .list_separator(","),
        );

        // Well-known env names used across the platform
        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }
        if let Ok(url) = env::var("NATS_URL") {
            builder = builder.set_override("broker.url", url)?;
        }
        if let Ok(enabled) = env::var("BROKER_ENABLED") {
            builder = builder.set_override("broker.enabled", enabled == "true" || enabled == "1")?;
        }
        if let Ok(sid) = env::var("TWILIO_ACCOUNT_SID") {
            builder = builder.set_override("twilio.account_sid", sid)?;
        }
        if let Ok(token) = env::var("TWILIO_AUTH_TOKEN") {
            builder = builder.set_override("twilio.auth_token", token)?;
        }
        if let Ok(url) = env::var("TWILIO_STATUS_CALLBACK_URL") {
            builder = builder.set_override("twilio.status_callback_url", url)?;
        }
        if let Ok(rate) = env::var("TWILIO_RATE_LIMIT_PER_SEC") {
            builder = builder.set_override("twilio.rate_limit_per_sec", rate)?;
        }
        if let Ok(burst) = env::var("TWILIO_RATE_LIMIT_BURST") {
            builder = builder.set_override("twilio.rate_limit_burst", burst)?;
        }
        if let Ok(interval) = env::var("PRE_QUEUE_WORKER_INTERVAL") {
            builder = builder.set_override("drip.pre_queue_interval_ms", interval)?;
        }
        if let Ok(minutes) = env::var("DRIP_PRE_QUEUE_MINUTES") {
            builder = builder.set_override("drip.pre_queue_minutes", minutes)?;
        }
        if let Ok(batch) = env::var("DRIP_PRE_QUEUE_BATCH") {
            builder = builder.set_override("drip.pre_queue_batch", batch)?;
        }
        if let Ok(prefetch) = env::var("DRIP_CONSUMER_PREFETCH") {
            builder = builder.set_override("drip.consumer_prefetch", prefetch)?;
        }
        if let Ok(delay) = env::var("DRIP_RATE_LIMIT_MS") {
            builder = builder.set_override("drip.rate_limit_ms", delay)?;
        }
        if let Ok(enabled) = env::var("HIGH_SCALE_DRIP_ENABLED") {
            builder = builder.set_override("drip.enabled", enabled == "true" || enabled == "1")?;
        }
        if let Ok(enabled) = env::var("MESSAGE_WORKER_ENABLED") {
            builder =
                builder.set_override("message_worker.enabled", enabled == "true" || enabled == "1")?;
        }
        if let Ok(prefetch) = env::var("MESSAGE_PREFETCH") {
            builder = builder.set_override("message_worker.prefetch", prefetch)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("Database URL is required".to_string());
        }

        if self.broker.enabled && self.broker.url.is_empty() {
            return Err("Broker URL is required when the broker is enabled".to_string());
        }

        if self.twilio.rate_limit_per_sec <= 0.0 {
            return Err("Gateway rate limit must be positive".to_string());
        }

        if self.twilio.rate_limit_burst < 1.0 {
            return Err("Gateway burst must be at least 1".to_string());
        }

        if self.drip.pre_queue_batch <= 0 {
            return Err("Pre-queue batch size must be positive".to_string());
        }

        if self.drip.pre_queue_minutes <= 0 {
            return Err("Pre-queue lead window must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8090,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/sengine".to_string(),
                max_connections: 20,
                min_connections: 2,
            },
            broker: BrokerConfig {
                url: "nats://localhost:4222".to_string(),
                enabled: true,
            },
            twilio: TwilioConfig {
                account_sid: "AC123".to_string(),
                auth_token: "secret".to_string(),
                status_callback_url: None,
                rate_limit_per_sec: 5.0,
                rate_limit_burst: 10.0,
            },
            drip: DripConfig {
                enabled: true,
                pre_queue_interval_ms: 30_000,
                pre_queue_minutes: 15,
                pre_queue_batch: 2_000,
                consumer_prefetch: 50,
                rate_limit_ms: 0,
            },
            message_worker: MessageWorkerConfig {
                enabled: true,
                prefetch: 50,
            },
            shutdown: ShutdownConfig {
                kill_timeout_secs: 10,
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_empty_database_url_rejected() {
        let mut config = base_config();
        config.database.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let mut config = base_config();
        config.twilio.rate_limit_per_sec = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_broker_url_optional_when_disabled() {
        let mut config = base_config();
        config.broker.enabled = false;
        config.broker.url = String::new();
        assert!(config.validate().is_ok());
    }
}
