use async_trait::async_trait;
use booking_core::Metrics;
use booking_service::{BookingService, UserService};
use booking_store::{DbClient, RedisClient};
use std::sync::Arc;
use std::time::Duration;

/// Dependencies the process needs before it can take traffic.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check(&self) -> anyhow::Result<()>;
}

pub struct StoreReadiness {
    pub db: DbClient,
    pub redis: RedisClient,
}

#[async_trait]
impl ReadinessCheck for StoreReadiness {
    async fn check(&self) -> anyhow::Result<()> {
        self.db.ping().await?;
        self.redis.ping().await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
    pub bookings: Arc<BookingService>,
    pub metrics: Arc<Metrics>,
    pub readiness: Arc<dyn ReadinessCheck>,
    /// Upper bound on one HTTP request, after which it gets a 504.
    pub request_timeout: Duration,
}
