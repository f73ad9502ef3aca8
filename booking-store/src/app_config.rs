use booking_core::{ConsumerConfig, RetryPolicy};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub port: u16,
    /// How long in-flight work gets after a shutdown signal.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Start the background booking-event consumer in this process.
    #[serde(default = "default_true")]
    pub run_consumer: bool,
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// How long a processed event id is remembered.
    pub processed_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub group_id: String,
    pub topics: Vec<String>,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub read_timeout_ms: u64,
    pub commit_interval_ms: u64,
    pub message_timeout_ms: u64,
    #[serde(default)]
    pub dead_letter_topic: Option<String>,
}

impl KafkaConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.backoff_ms))
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            retry: self.retry_policy(),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            ..ConsumerConfig::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // BOOKING__KAFKA__BROKERS=... and BOOKING__KAFKA__TOPICS=a,b
            .add_source(
                config::Environment::with_prefix("BOOKING")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("kafka.topics"),
            )
            .build()?;

        s.try_deserialize()
    }
}
