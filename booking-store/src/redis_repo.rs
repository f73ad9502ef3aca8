use async_trait::async_trait;
use booking_core::ProcessedEvents;
use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.exists(key).await
    }

    async fn set_marker(&self, key: &str, ttl_seconds: u64) -> Result<(), redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(key, 1, ttl_seconds).await
    }
}

/// Processed envelope ids kept in redis with a TTL, shared by every consumer
/// in the group.
pub struct RedisProcessedEvents {
    redis: RedisClient,
    ttl_seconds: u64,
}

impl RedisProcessedEvents {
    pub fn new(redis: RedisClient, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }
}

pub(crate) fn processed_key(event_id: Uuid) -> String {
    format!("processed:{}", event_id)
}

#[async_trait]
impl ProcessedEvents for RedisProcessedEvents {
    async fn is_processed(&self, event_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.redis.exists(&processed_key(event_id)).await?)
    }

    async fn mark_processed(&self, event_id: Uuid) -> anyhow::Result<()> {
        self.redis
            .set_marker(&processed_key(event_id), self.ttl_seconds)
            .await?;
        debug!(event_id = %event_id, ttl = self.ttl_seconds, "Event marked processed");
        Ok(())
    }
}
