//! Consumer-side handlers. Each booking status change is owned by exactly one
//! event type and is guarded by the domain transition rules.

use anyhow::anyhow;
use async_trait::async_trait;
use booking_core::{
    decode, HandlerError, HandlerRegistry, Idempotent, Message, MessageHandler, Metrics, ProcessedEvents,
};
use booking_domain::{Booking, BookingRepository, BookingStatus, DomainError, RepositoryError};
use booking_shared::models::events::{
    BookingCancelledData, InventoryReservedData, PaymentFailedData, PaymentProcessedData,
};
use booking_shared::EventType;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// A missing booking is retried: the creating write may not be visible yet.
/// So is a stale one; the next attempt reloads it.
fn repo_error(err: RepositoryError) -> HandlerError {
    match err {
        RepositoryError::Duplicate(what) => HandlerError::Conflict(format!("{what} already exists")),
        other => HandlerError::Failed(anyhow::Error::new(other)),
    }
}

fn domain_error(err: DomainError) -> HandlerError {
    if err.is_conflict() {
        HandlerError::Conflict(err.to_string())
    } else {
        HandlerError::Malformed(err.to_string())
    }
}

/// Handles one booking-affecting event type against the booking store.
#[derive(Clone)]
pub struct BookingEventHandler {
    kind: EventType,
    repo: Arc<dyn BookingRepository>,
    metrics: Arc<Metrics>,
}

impl BookingEventHandler {
    /// Event types this handler knows how to apply.
    pub const HANDLED: [EventType; 4] = [
        EventType::PaymentProcessed,
        EventType::PaymentFailed,
        EventType::BookingCancelled,
        EventType::InventoryReserved,
    ];

    pub fn new(kind: EventType, repo: Arc<dyn BookingRepository>, metrics: Arc<Metrics>) -> Option<Self> {
        Self::HANDLED
            .contains(&kind)
            .then_some(Self { kind, repo, metrics })
    }

    async fn load(&self, booking_id: Uuid) -> Result<Booking, HandlerError> {
        self.repo.get(booking_id).await.map_err(repo_error)
    }

    /// Writes the new status only if the stored one is still `expected`.
    async fn save(&self, booking: &Booking, expected: BookingStatus) -> Result<(), HandlerError> {
        self.repo.update_status(booking, expected).await.map_err(repo_error)?;
        if booking.status != expected {
            self.metrics.record_booking(booking.status.as_str());
        }
        Ok(())
    }

    async fn payment_processed(&self, message: &Message) -> Result<(), HandlerError> {
        let data = decode::<PaymentProcessedData>(message)?.data;
        let mut booking = self.load(data.booking_id).await?;

        if booking.status == BookingStatus::Confirmed
            && booking.payment_id.as_deref() == Some(data.payment_id.as_str())
        {
            debug!(booking_id = %booking.id, "Payment already applied");
            return Ok(());
        }

        let loaded = booking.status;
        booking
            .transition_to(BookingStatus::Confirmed, Utc::now())
            .map_err(domain_error)?;

        let active = self
            .repo
            .find_active_by_resource(booking.resource_id)
            .await
            .map_err(repo_error)?;
        booking.ensure_no_overlap(&active).map_err(domain_error)?;

        booking.payment_id = Some(data.payment_id);
        self.save(&booking, loaded).await?;

        info!(booking_id = %booking.id, payment_id = ?booking.payment_id, "Booking confirmed");
        Ok(())
    }

    async fn payment_failed(&self, message: &Message) -> Result<(), HandlerError> {
        let data = decode::<PaymentFailedData>(message)?.data;
        self.settle(data.booking_id, BookingStatus::Failed, &data.reason).await
    }

    async fn booking_cancelled(&self, message: &Message) -> Result<(), HandlerError> {
        let data = decode::<BookingCancelledData>(message)?.data;
        self.settle(data.booking_id, BookingStatus::Cancelled, &data.reason).await
    }

    /// Moves a booking into a terminal status; already being there is a no-op.
    async fn settle(&self, booking_id: Uuid, status: BookingStatus, reason: &str) -> Result<(), HandlerError> {
        let mut booking = self.load(booking_id).await?;
        if booking.status == status {
            debug!(booking_id = %booking.id, status = %status, "Booking already settled");
            return Ok(());
        }

        let loaded = booking.status;
        booking.transition_to(status, Utc::now()).map_err(domain_error)?;
        self.save(&booking, loaded).await?;

        info!(booking_id = %booking.id, status = %status, reason, "Booking settled");
        Ok(())
    }

    async fn inventory_reserved(&self, message: &Message) -> Result<(), HandlerError> {
        let data = decode::<InventoryReservedData>(message)?.data;
        let mut booking = self.load(data.booking_id).await?;

        if booking.reservation_id.as_deref() == Some(data.reservation_id.as_str()) {
            return Ok(());
        }
        if data.resource_id != booking.resource_id {
            return Err(HandlerError::Malformed(format!(
                "reservation {} is for resource {}, booking {} holds {}",
                data.reservation_id, data.resource_id, booking.id, booking.resource_id
            )));
        }
        if !booking.is_active() {
            return Err(HandlerError::Conflict(format!(
                "booking {} is {}, reservation {} not recorded",
                booking.id, booking.status, data.reservation_id
            )));
        }

        booking.reservation_id = Some(data.reservation_id);
        booking.updated_at = Utc::now();
        self.save(&booking, booking.status).await?;

        info!(booking_id = %booking.id, reservation_id = ?booking.reservation_id, "Reservation recorded");
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for BookingEventHandler {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        match self.kind {
            EventType::PaymentProcessed => self.payment_processed(message).await,
            EventType::PaymentFailed => self.payment_failed(message).await,
            EventType::BookingCancelled => self.booking_cancelled(message).await,
            EventType::InventoryReserved => self.inventory_reserved(message).await,
            other => Err(HandlerError::Failed(anyhow!("no booking transition for {other}"))),
        }
    }
}

/// Registers every booking handler, each deduplicated by envelope id through `processed`.
pub fn register_booking_handlers(
    registry: &mut HandlerRegistry,
    repo: Arc<dyn BookingRepository>,
    processed: Arc<dyn ProcessedEvents>,
    metrics: Arc<Metrics>,
) {
    for kind in BookingEventHandler::HANDLED {
        let handler = BookingEventHandler {
            kind,
            repo: repo.clone(),
            metrics: metrics.clone(),
        };
        registry.register(kind.as_str(), Idempotent::new(handler, processed.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_core::headers;
    use booking_domain::booking::CreateBookingRequest;
    use booking_domain::memory::InMemoryBookingRepository;
    use booking_shared::{topics, Envelope};
    use chrono::{DateTime, TimeZone};
    use serde::Serialize;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, hour, 0, 0).unwrap()
    }

    fn message<T: Serialize>(event: &Envelope<T>) -> Message {
        Message::new(event.event_type().topic(), "k", serde_json::to_vec(event).unwrap())
            .with_header(headers::MESSAGE_TYPE, event.event_type().as_str())
    }

    fn payment(booking_id: Uuid, payment_id: &str) -> Envelope<PaymentProcessedData> {
        Envelope::new(
            EventType::PaymentProcessed,
            "payment-service",
            None,
            PaymentProcessedData {
                booking_id,
                payment_id: payment_id.into(),
                amount: 5000,
                currency: "USD".into(),
            },
        )
    }

    async fn seed(repo: &InMemoryBookingRepository, resource_id: Uuid, start: u32, end: u32) -> Booking {
        let req = CreateBookingRequest {
            user_id: Uuid::new_v4(),
            resource_id,
            start_time: at(start),
            end_time: at(end),
            amount: 5000,
            currency: "USD".into(),
            notes: None,
        };
        let booking = Booking::new_pending(&req, at(8)).unwrap();
        repo.create(&booking).await.unwrap();
        booking
    }

    fn handler(kind: EventType, repo: &Arc<InMemoryBookingRepository>) -> BookingEventHandler {
        BookingEventHandler::new(kind, repo.clone(), Arc::new(Metrics::new().unwrap())).unwrap()
    }

    #[tokio::test]
    async fn test_payment_confirms_pending_booking() {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let booking = seed(&repo, Uuid::new_v4(), 10, 11).await;

        handler(EventType::PaymentProcessed, &repo)
            .handle(&message(&payment(booking.id, "pay_1")))
            .await
            .unwrap();

        let stored = repo.get(booking.id).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(stored.payment_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn test_redelivered_payment_leaves_same_state() {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let booking = seed(&repo, Uuid::new_v4(), 10, 11).await;
        let h = handler(EventType::PaymentProcessed, &repo);
        let msg = message(&payment(booking.id, "pay_1"));

        h.handle(&msg).await.unwrap();
        let once = repo.get(booking.id).await.unwrap();
        h.handle(&msg).await.unwrap();
        let twice = repo.get(booking.id).await.unwrap();

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_second_payment_for_confirmed_booking_is_conflict() {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let booking = seed(&repo, Uuid::new_v4(), 10, 11).await;
        let h = handler(EventType::PaymentProcessed, &repo);

        h.handle(&message(&payment(booking.id, "pay_1"))).await.unwrap();
        let err = h
            .handle(&message(&payment(booking.id, "pay_2")))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_confirmation_blocked_by_overlapping_active_booking() {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let room = Uuid::new_v4();
        let first = seed(&repo, room, 10, 12).await;
        let h = handler(EventType::PaymentProcessed, &repo);
        h.handle(&message(&payment(first.id, "pay_1"))).await.unwrap();

        // Written around the service, which would have refused it.
        let second = seed(&repo, room, 11, 13).await;
        let err = h
            .handle(&message(&payment(second.id, "pay_2")))
            .await
            .unwrap_err();

        assert!(matches!(err, HandlerError::Conflict(_)));
        assert_eq!(repo.get(second.id).await.unwrap().status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_booking_is_retryable() {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let err = handler(EventType::PaymentProcessed, &repo)
            .handle(&message(&payment(Uuid::new_v4(), "pay_1")))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_payment_failure_and_cancellation_settle_once() {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let booking = seed(&repo, Uuid::new_v4(), 10, 11).await;

        let failed = Envelope::new(
            EventType::PaymentFailed,
            "payment-service",
            None,
            PaymentFailedData {
                booking_id: booking.id,
                reason: "card declined".into(),
            },
        );
        let h = handler(EventType::PaymentFailed, &repo);
        h.handle(&message(&failed)).await.unwrap();
        h.handle(&message(&failed)).await.unwrap();
        assert_eq!(repo.get(booking.id).await.unwrap().status, BookingStatus::Failed);

        let cancelled = Envelope::new(
            EventType::BookingCancelled,
            "booking-service",
            None,
            BookingCancelledData {
                booking_id: booking.id,
                reason: "user request".into(),
            },
        );
        let err = handler(EventType::BookingCancelled, &repo)
            .handle(&message(&cancelled))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_reservation_recorded_on_active_booking() {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let room = Uuid::new_v4();
        let booking = seed(&repo, room, 10, 11).await;

        let reserved = Envelope::new(
            EventType::InventoryReserved,
            "inventory-service",
            None,
            InventoryReservedData {
                booking_id: booking.id,
                reservation_id: "res_7".into(),
                resource_id: room,
            },
        );
        let h = handler(EventType::InventoryReserved, &repo);
        h.handle(&message(&reserved)).await.unwrap();
        h.handle(&message(&reserved)).await.unwrap();

        let stored = repo.get(booking.id).await.unwrap();
        assert_eq!(stored.reservation_id.as_deref(), Some("res_7"));
        assert_eq!(stored.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_wrong_payload_is_malformed() {
        let repo = Arc::new(InMemoryBookingRepository::new());
        let bogus = Message::new(topics::PAYMENT_EVENTS, "k", br#"{"type":"payment.processed"}"#.to_vec());
        let err = handler(EventType::PaymentProcessed, &repo)
            .handle(&bogus)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Malformed(_)));
    }

    #[test]
    fn test_only_booking_events_get_a_handler() {
        let repo: Arc<dyn BookingRepository> = Arc::new(InMemoryBookingRepository::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        assert!(BookingEventHandler::new(EventType::UserCreated, repo.clone(), metrics.clone()).is_none());
        assert!(BookingEventHandler::new(EventType::PaymentFailed, repo, metrics).is_some());
    }
}
