use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserCreatedData {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserUpdatedData {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserDeletedData {
    pub user_id: Uuid,
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingRequestedData {
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub resource_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingUpdatedData {
    pub booking_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingConfirmedData {
    pub booking_id: Uuid,
    pub payment_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingCancelledData {
    pub booking_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentProcessedData {
    pub booking_id: Uuid,
    pub payment_id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentFailedData {
    pub booking_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InventoryReservedData {
    pub booking_id: Uuid,
    pub reservation_id: String,
    pub resource_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InventoryReleasedData {
    pub booking_id: Uuid,
    pub reservation_id: String,
}
