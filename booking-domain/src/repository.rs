use async_trait::async_trait;
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::user::User;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Duplicate(String),

    /// The stored row moved on since it was read.
    #[error("{0} was modified concurrently")]
    Stale(&'static str),

    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RepositoryError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RepositoryError::Backend(Box::new(err))
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Persistence for bookings
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create(&self, booking: &Booking) -> RepoResult<()>;

    async fn get(&self, id: Uuid) -> RepoResult<Booking>;

    /// Writes `start_time`, `end_time`, `notes` and `updated_at` of a booking that is
    /// still `pending`. Status, payment and reservation columns are left alone.
    ///
    /// `Stale` when the stored booking is no longer `pending`.
    async fn update_schedule(&self, booking: &Booking) -> RepoResult<()>;

    /// Writes `status`, `payment_id`, `reservation_id` and `updated_at` only if the
    /// stored status still equals `expected`; `Stale` otherwise.
    async fn update_status(&self, booking: &Booking, expected: BookingStatus) -> RepoResult<()>;

    /// Pending and confirmed bookings holding `resource_id`.
    async fn find_active_by_resource(&self, resource_id: Uuid) -> RepoResult<Vec<Booking>>;
}

/// Persistence for users
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> RepoResult<()>;

    async fn get(&self, id: Uuid) -> RepoResult<User>;

    async fn get_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    async fn update(&self, user: &User) -> RepoResult<()>;

    async fn delete(&self, id: Uuid) -> RepoResult<()>;

    /// One page of users plus the total count.
    async fn list(&self, limit: i64, offset: i64) -> RepoResult<(Vec<User>, i64)>;
}
