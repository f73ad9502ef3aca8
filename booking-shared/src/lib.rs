pub mod envelope;
pub mod models;
pub mod pii;

pub use envelope::{BaseEvent, Envelope, EventType, UnknownEventType, SCHEMA_VERSION};
pub use pii::Masked;

/// Topic names, one per coarse event family.
pub mod topics {
    pub const USER_EVENTS: &str = "user-events";
    pub const BOOKING_EVENTS: &str = "booking-events";
    pub const INVENTORY_EVENTS: &str = "inventory-events";
    pub const PAYMENT_EVENTS: &str = "payment-events";
    pub const NOTIFICATION_EVENTS: &str = "notification-events";
}
