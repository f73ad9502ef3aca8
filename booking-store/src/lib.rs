//! Infrastructure adapters: Kafka transport, Postgres repositories, redis
//! deduplication store and layered configuration.

pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod kafka;
pub mod redis_repo;
pub mod user_repo;

pub use app_config::Config;
pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use kafka::{KafkaReader, KafkaWriter};
pub use redis_repo::{RedisClient, RedisProcessedEvents};
pub use user_repo::PgUserRepository;
