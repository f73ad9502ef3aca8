//! Write-path services that mutate bookings and users then publish, and the
//! consumer-side handlers that advance booking status from downstream events.

pub mod bookings;
pub mod handlers;
pub mod users;

pub use bookings::BookingService;
pub use handlers::{register_booking_handlers, BookingEventHandler};
pub use users::{normalize_paging, UserPage, UserService};

use booking_core::{CancellationToken, Producer};
use booking_domain::{DomainError, RepositoryError};
use booking_shared::Envelope;
use serde::Serialize;

pub const USER_SERVICE: &str = "user-service";
pub const BOOKING_SERVICE: &str = "booking-service";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Event could not be published: {0}")]
    Publish(#[source] booking_core::DeliveryError),

    #[error("Storage error: {0}")]
    Storage(#[source] RepositoryError),
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        if err.is_conflict() {
            ServiceError::Conflict(err.to_string())
        } else {
            ServiceError::Validation(err.to_string())
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(entity) => ServiceError::NotFound(entity),
            RepositoryError::Duplicate(what) => ServiceError::Conflict(format!("{what} already exists")),
            RepositoryError::Stale(entity) => {
                ServiceError::Conflict(format!("{entity} changed while the request was applied"))
            }
            other => ServiceError::Storage(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Publishes after a committed write. Failure is logged and never undoes the write.
pub(crate) async fn publish_after_write<T: Serialize>(
    producer: &Producer,
    cancel: &CancellationToken,
    key: &str,
    event: &Envelope<T>,
) {
    let event_type = event.event_type();
    if let Err(err) = producer.publish(cancel, event_type.topic(), key, event).await {
        tracing::error!(
            event_type = %event_type,
            event_id = %event.id(),
            key,
            error = %err,
            "Failed to publish event, write kept"
        );
    }
}
