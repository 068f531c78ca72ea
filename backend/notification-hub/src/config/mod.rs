use crate::error::{AppError, Result};
use opentelemetry_config::TracingConfig;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub kafka: KafkaConfig,
    pub websocket: WebSocketConfig,
    pub tracing: TracingConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub service_name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Broker addresses; empty disables the consumer
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    /// Only messages keyed with this event type are normalized and broadcast
    pub event_key: String,
    pub poll_timeout: Duration,
    pub retry_backoff: Duration,
    pub commit_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Deadline for a single outbound frame; `None` waits indefinitely
    pub write_timeout: Option<Duration>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            topic: "chat.events".to_string(),
            group_id: "notification-group".to_string(),
            event_key: "chat.message_posted".to_string(),
            poll_timeout: Duration::from_millis(500),
            retry_backoff: Duration::from_secs(1),
            commit_interval: Duration::from_secs(1),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl KafkaConfig {
    /// Comma-separated broker list, as librdkafka expects it
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// `configs/{APP_ENV}.env` and `.env` are loaded first when present; variables
    /// already set in the environment always win.
    pub fn from_env() -> Result<Self> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        dotenvy::from_filename(format!("configs/{}.env", app_env)).ok();
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let kafka_defaults = KafkaConfig::default();

        let brokers = lookup("KAFKA_BROKERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let write_timeout_ms: u64 = parse_or(&lookup, "WS_WRITE_TIMEOUT_MS", 5000)?;

        Ok(Config {
            app: AppConfig {
                env: lookup("APP_ENV").unwrap_or_else(|| "development".to_string()),
                service_name: lookup("SERVICE_NAME")
                    .unwrap_or_else(|| "notification-service".to_string()),
                host: lookup("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "HTTP_PORT", 8080)?,
            },
            kafka: KafkaConfig {
                brokers,
                topic: lookup("KAFKA_TOPIC").unwrap_or(kafka_defaults.topic),
                group_id: lookup("KAFKA_GROUP_ID").unwrap_or(kafka_defaults.group_id),
                event_key: lookup("KAFKA_EVENT_KEY").unwrap_or(kafka_defaults.event_key),
                poll_timeout: Duration::from_millis(parse_or(
                    &lookup,
                    "KAFKA_POLL_TIMEOUT_MS",
                    500,
                )?),
                retry_backoff: Duration::from_millis(parse_or(
                    &lookup,
                    "KAFKA_RETRY_BACKOFF_MS",
                    1000,
                )?),
                commit_interval: Duration::from_millis(parse_or(
                    &lookup,
                    "KAFKA_COMMIT_INTERVAL_MS",
                    1000,
                )?),
            },
            websocket: WebSocketConfig {
                write_timeout: (write_timeout_ms > 0)
                    .then(|| Duration::from_millis(write_timeout_ms)),
            },
            tracing: TracingConfig::from_lookup(&lookup),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::Config(format!(
                "{} must be a valid {}, got {:?}",
                key,
                std::any::type_name::<T>(),
                raw
            ))
        }),
        None => Ok(default),
    }
}
