use booking_core::{CancellationToken, Producer};
use booking_domain::booking::{CancelBookingRequest, CreateBookingRequest, UpdateBookingRequest};
use booking_domain::{Booking, BookingRepository};
use booking_shared::models::events::{BookingCancelledData, BookingRequestedData, BookingUpdatedData};
use booking_shared::{Envelope, EventType};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{publish_after_write, ServiceError, ServiceResult, BOOKING_SERVICE};

/// Creates and edits bookings. Status changes after creation belong to the
/// event handlers; this service only requests them.
pub struct BookingService {
    repo: Arc<dyn BookingRepository>,
    producer: Producer,
    shutdown: CancellationToken,
}

impl BookingService {
    pub fn new(repo: Arc<dyn BookingRepository>, producer: Producer, shutdown: CancellationToken) -> Self {
        Self {
            repo,
            producer,
            shutdown,
        }
    }

    pub async fn create_booking(
        &self,
        req: CreateBookingRequest,
        trace_id: Option<String>,
    ) -> ServiceResult<Booking> {
        let booking = Booking::new_pending(&req, Utc::now())?;
        let active = self.repo.find_active_by_resource(booking.resource_id).await?;
        booking.ensure_no_overlap(&active)?;
        self.repo.create(&booking).await?;
        self.producer.metrics().record_booking(booking.status.as_str());

        let event = Envelope::new(
            EventType::BookingRequested,
            BOOKING_SERVICE,
            trace_id,
            BookingRequestedData {
                booking_id: booking.id,
                user_id: booking.user_id,
                resource_id: booking.resource_id,
                start_time: booking.start_time,
                end_time: booking.end_time,
                amount: booking.amount,
                currency: booking.currency.clone(),
            },
        );
        publish_after_write(&self.producer, &self.shutdown, &booking.id.to_string(), &event).await;

        info!(
            booking_id = %booking.id,
            resource_id = %booking.resource_id,
            start = %booking.start_time,
            end = %booking.end_time,
            "Booking requested"
        );
        Ok(booking)
    }

    pub async fn get_booking(&self, id: Uuid) -> ServiceResult<Booking> {
        Ok(self.repo.get(id).await?)
    }

    /// Reschedules or annotates a booking that is still `pending`.
    pub async fn update_booking(
        &self,
        id: Uuid,
        req: UpdateBookingRequest,
        trace_id: Option<String>,
    ) -> ServiceResult<Booking> {
        let mut booking = self.repo.get(id).await?;
        booking.apply_update(&req, Utc::now())?;

        let active = self.repo.find_active_by_resource(booking.resource_id).await?;
        booking.ensure_no_overlap(&active)?;
        // Refused if an event handler moved the booking out of `pending` meanwhile.
        self.repo.update_schedule(&booking).await?;

        let event = Envelope::new(
            EventType::BookingUpdated,
            BOOKING_SERVICE,
            trace_id,
            BookingUpdatedData {
                booking_id: booking.id,
                start_time: booking.start_time,
                end_time: booking.end_time,
                notes: booking.notes.clone(),
            },
        );
        publish_after_write(&self.producer, &self.shutdown, &booking.id.to_string(), &event).await;

        info!(booking_id = %booking.id, "Booking updated");
        Ok(booking)
    }

    /// Publishes `booking.cancelled`; the cancellation handler applies it.
    ///
    /// Nothing is written here, so a failed publish is returned to the caller.
    pub async fn request_cancellation(
        &self,
        id: Uuid,
        req: CancelBookingRequest,
        trace_id: Option<String>,
    ) -> ServiceResult<Booking> {
        let reason = req.reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::Validation("cancellation reason is required".into()));
        }

        let booking = self.repo.get(id).await?;
        if !booking.can_be_cancelled() {
            return Err(ServiceError::Conflict(format!(
                "booking {} is {} and can no longer be cancelled",
                booking.id, booking.status
            )));
        }

        let event = Envelope::new(
            EventType::BookingCancelled,
            BOOKING_SERVICE,
            trace_id,
            BookingCancelledData {
                booking_id: booking.id,
                reason: reason.to_string(),
            },
        );
        self.producer
            .publish(
                &self.shutdown,
                EventType::BookingCancelled.topic(),
                &booking.id.to_string(),
                &event,
            )
            .await
            .map_err(ServiceError::Publish)?;

        info!(booking_id = %booking.id, "Booking cancellation requested");
        Ok(booking)
    }
}
