use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::topics;

/// Version stamped on every envelope produced by this build.
pub const SCHEMA_VERSION: &str = "1.0";

/// Kind of domain event carried by an [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "user.created")]
    UserCreated,
    #[serde(rename = "user.updated")]
    UserUpdated,
    #[serde(rename = "user.deleted")]
    UserDeleted,

    #[serde(rename = "booking.requested")]
    BookingRequested,
    #[serde(rename = "booking.confirmed")]
    BookingConfirmed,
    #[serde(rename = "booking.cancelled")]
    BookingCancelled,
    #[serde(rename = "booking.updated")]
    BookingUpdated,

    #[serde(rename = "inventory.reserved")]
    InventoryReserved,
    #[serde(rename = "inventory.released")]
    InventoryReleased,
    #[serde(rename = "inventory.updated")]
    InventoryUpdated,

    #[serde(rename = "payment.processed")]
    PaymentProcessed,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "payment.refunded")]
    PaymentRefunded,

    #[serde(rename = "notification.sent")]
    NotificationSent,
    #[serde(rename = "notification.failed")]
    NotificationFailed,
}

impl EventType {
    pub const ALL: [EventType; 15] = [
        EventType::UserCreated,
        EventType::UserUpdated,
        EventType::UserDeleted,
        EventType::BookingRequested,
        EventType::BookingConfirmed,
        EventType::BookingCancelled,
        EventType::BookingUpdated,
        EventType::InventoryReserved,
        EventType::InventoryReleased,
        EventType::InventoryUpdated,
        EventType::PaymentProcessed,
        EventType::PaymentFailed,
        EventType::PaymentRefunded,
        EventType::NotificationSent,
        EventType::NotificationFailed,
    ];

    /// Wire tag, also used as the `message-type` header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserCreated => "user.created",
            EventType::UserUpdated => "user.updated",
            EventType::UserDeleted => "user.deleted",
            EventType::BookingRequested => "booking.requested",
            EventType::BookingConfirmed => "booking.confirmed",
            EventType::BookingCancelled => "booking.cancelled",
            EventType::BookingUpdated => "booking.updated",
            EventType::InventoryReserved => "inventory.reserved",
            EventType::InventoryReleased => "inventory.released",
            EventType::InventoryUpdated => "inventory.updated",
            EventType::PaymentProcessed => "payment.processed",
            EventType::PaymentFailed => "payment.failed",
            EventType::PaymentRefunded => "payment.refunded",
            EventType::NotificationSent => "notification.sent",
            EventType::NotificationFailed => "notification.failed",
        }
    }

    /// Topic of the event family this type belongs to.
    pub fn topic(&self) -> &'static str {
        match self {
            EventType::UserCreated | EventType::UserUpdated | EventType::UserDeleted => {
                topics::USER_EVENTS
            }
            EventType::BookingRequested
            | EventType::BookingConfirmed
            | EventType::BookingCancelled
            | EventType::BookingUpdated => topics::BOOKING_EVENTS,
            EventType::InventoryReserved
            | EventType::InventoryReleased
            | EventType::InventoryUpdated => topics::INVENTORY_EVENTS,
            EventType::PaymentProcessed | EventType::PaymentFailed | EventType::PaymentRefunded => {
                topics::PAYMENT_EVENTS
            }
            EventType::NotificationSent | EventType::NotificationFailed => {
                topics::NOTIFICATION_EVENTS
            }
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// Metadata shared by every event, independent of its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl BaseEvent {
    /// Fresh id, current UTC time, current schema version, empty metadata.
    pub fn new(event_type: EventType, source: impl Into<String>, trace_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            source: source.into(),
            timestamp: Utc::now(),
            version: SCHEMA_VERSION.to_string(),
            trace_id,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn wrap<T>(self, data: T) -> Envelope<T> {
        Envelope { base: self, data }
    }
}

/// A domain event as it travels on the wire: base metadata plus typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(flatten)]
    pub base: BaseEvent,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(
        event_type: EventType,
        source: impl Into<String>,
        trace_id: Option<String>,
        data: T,
    ) -> Self {
        BaseEvent::new(event_type, source, trace_id).wrap(data)
    }

    pub fn id(&self) -> Uuid {
        self.base.id
    }

    pub fn event_type(&self) -> EventType {
        self.base.event_type
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.base.trace_id.as_deref()
    }
}
