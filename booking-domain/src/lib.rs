pub mod booking;
pub mod memory;
pub mod repository;
pub mod user;

pub use booking::{can_transition, is_overlapping, Booking, BookingStatus};
pub use repository::{BookingRepository, RepoResult, RepositoryError, UserRepository};
pub use user::User;

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Booking {booking_id} overlaps active booking {other_id} on resource {resource_id}")]
    Overlap {
        booking_id: Uuid,
        other_id: Uuid,
        resource_id: Uuid,
    },

    #[error("Booking in status {0} can no longer be modified")]
    NotModifiable(BookingStatus),

    #[error("End time must be after start time")]
    InvalidInterval,

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    /// Conflicts are permanent: retrying the same input cannot succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DomainError::InvalidTransition { .. }
                | DomainError::Overlap { .. }
                | DomainError::NotModifiable(_)
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
