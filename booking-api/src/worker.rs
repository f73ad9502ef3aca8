use booking_core::{
    CancellationToken, Consumer, ConsumerConfig, DeliveryError, ExhaustedPolicy, HandlerRegistry,
    MessageReader, Metrics, ProcessedEvents,
};
use booking_domain::BookingRepository;
use booking_service::register_booking_handlers;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct WorkerDeps {
    pub repo: Arc<dyn BookingRepository>,
    pub processed: Arc<dyn ProcessedEvents>,
    pub metrics: Arc<Metrics>,
    pub config: ConsumerConfig,
    pub exhausted: ExhaustedPolicy,
}

/// Starts the booking-event consumer on its own task. It stops when `shutdown`
/// fires or the reader closes.
pub fn start_booking_worker<R>(
    reader: R,
    deps: WorkerDeps,
    shutdown: CancellationToken,
) -> JoinHandle<Result<(), DeliveryError>>
where
    R: MessageReader + 'static,
{
    let mut registry = HandlerRegistry::new();
    register_booking_handlers(&mut registry, deps.repo, deps.processed, deps.metrics.clone());

    let mut consumer = Consumer::new(reader, Arc::new(registry), deps.metrics)
        .with_config(deps.config)
        .with_exhausted_policy(deps.exhausted);

    tokio::spawn(async move {
        let result = consumer.run(shutdown).await;
        match &result {
            Ok(()) => info!("Booking worker finished"),
            Err(err) => error!(error = %err, "Booking worker failed"),
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_core::{InMemoryProcessedEvents, MemoryBroker, Producer};
    use booking_domain::booking::CreateBookingRequest;
    use booking_domain::memory::InMemoryBookingRepository;
    use booking_domain::{Booking, BookingStatus};
    use booking_shared::models::events::PaymentFailedData;
    use booking_shared::{topics, Envelope, EventType};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_worker_applies_payment_failure_until_transport_closes() {
        let broker = MemoryBroker::new();
        let metrics = Arc::new(Metrics::new().unwrap());
        let repo = Arc::new(InMemoryBookingRepository::new());

        let start = Utc::now() + Duration::days(2);
        let booking = Booking::new_pending(
            &CreateBookingRequest {
                user_id: Uuid::new_v4(),
                resource_id: Uuid::new_v4(),
                start_time: start,
                end_time: start + Duration::hours(2),
                amount: 4_000,
                currency: "USD".into(),
                notes: None,
            },
            Utc::now(),
        )
        .unwrap();
        repo.create(&booking).await.unwrap();

        let producer = Producer::new(Arc::new(broker.clone()), metrics.clone());
        let event = Envelope::new(
            EventType::PaymentFailed,
            "payment-service",
            None,
            PaymentFailedData {
                booking_id: booking.id,
                reason: "card declined".into(),
            },
        );
        producer
            .publish(&CancellationToken::new(), topics::PAYMENT_EVENTS, &booking.id.to_string(), &event)
            .await
            .unwrap();
        broker.close();

        let handle = start_booking_worker(
            broker.reader(&[topics::PAYMENT_EVENTS]),
            WorkerDeps {
                repo: repo.clone(),
                processed: Arc::new(InMemoryProcessedEvents::new()),
                metrics: metrics.clone(),
                config: ConsumerConfig::default(),
                exhausted: ExhaustedPolicy::Drop,
            },
            CancellationToken::new(),
        );
        handle.await.unwrap().unwrap();

        assert_eq!(repo.get(booking.id).await.unwrap().status, BookingStatus::Failed);
        assert_eq!(metrics.consumed_count(topics::PAYMENT_EVENTS), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_stops_on_shutdown() {
        let broker = MemoryBroker::new();
        let shutdown = CancellationToken::new();
        let handle = start_booking_worker(
            broker.reader(&[topics::PAYMENT_EVENTS]),
            WorkerDeps {
                repo: Arc::new(InMemoryBookingRepository::new()),
                processed: Arc::new(InMemoryProcessedEvents::new()),
                metrics: Arc::new(Metrics::new().unwrap()),
                config: ConsumerConfig::default(),
                exhausted: ExhaustedPolicy::Drop,
            },
            shutdown.clone(),
        );

        tokio::time::sleep(std::time::Duration::from_secs(7)).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
