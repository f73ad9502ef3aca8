use booking_shared::Envelope;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::error::{DeliveryError, ErrorKind};
use crate::message::{headers, Message};
use crate::metrics::Metrics;
use crate::retry::{retry_cancellable, RetryOutcome, RetryPolicy};
use crate::transport::{MessageWriter, TransportError, WriteAck};

/// Publishes envelopes with bounded retry. Cheap to clone; clones share one writer.
#[derive(Clone)]
pub struct Producer {
    writer: Arc<dyn MessageWriter>,
    metrics: Arc<Metrics>,
    policy: RetryPolicy,
}

impl Producer {
    pub fn new(writer: Arc<dyn MessageWriter>, metrics: Arc<Metrics>) -> Self {
        Self {
            writer,
            metrics,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Serializes `event` and writes it to `topic`.
    ///
    /// Returns only once every required replica acknowledged the write. A
    /// serialization fault fails immediately; broker failures are retried and
    /// surface as `Unavailable` once attempts run out.
    pub async fn publish<T: Serialize>(
        &self,
        cancel: &CancellationToken,
        topic: &str,
        key: &str,
        event: &Envelope<T>,
    ) -> Result<(), DeliveryError> {
        let value = match serde_json::to_vec(event) {
            Ok(value) => value,
            Err(err) => {
                self.metrics.record_error(topic, ErrorKind::Serialization);
                error!(topic, event_id = %event.id(), error = %err, "Failed to serialize event");
                return Err(err.into());
            }
        };

        let mut message = Message::new(topic, key, value)
            .with_header(headers::CONTENT_TYPE, headers::JSON)
            .with_header(headers::MESSAGE_TYPE, event.event_type().as_str());
        if let Some(trace_id) = event.trace_id() {
            message.headers.insert(headers::TRACE_ID, trace_id);
        }

        self.publish_message(cancel, message).await
    }

    /// Writes a prepared message as-is. Used for forwarding and replays.
    pub async fn publish_message(
        &self,
        cancel: &CancellationToken,
        message: Message,
    ) -> Result<(), DeliveryError> {
        let span = info_span!(
            "kafka.produce",
            topic = %message.topic,
            key = %message.key_str(),
            message_type = message.headers.get_str(headers::MESSAGE_TYPE).unwrap_or_default(),
        );

        async {
            let writer = self.writer.as_ref();
            let msg = &message;

            let outcome = retry_cancellable(&self.policy, cancel, |_| true, |attempt| async move {
                let result = match writer.write(msg).await {
                    Ok(WriteAck::Full) => Ok(()),
                    Ok(WriteAck::Partial { acked, required }) => {
                        Err(TransportError::PartialAck { acked, required })
                    }
                    Err(err) => Err(err),
                };
                if let Err(err) = &result {
                    warn!(attempt, error = %err, "Publish attempt failed");
                }
                result
            })
            .await;

            let topic = message.topic.as_str();
            match outcome {
                RetryOutcome::Succeeded { attempts, .. } => {
                    self.metrics.record_produced(topic);
                    debug!(attempts, "Message published");
                    Ok(())
                }
                RetryOutcome::Exhausted { last: source, attempts }
                | RetryOutcome::Aborted { error: source, attempts } => {
                    self.metrics.record_error(topic, ErrorKind::Unavailable);
                    error!(attempts, error = %source, "Failed to publish message after retries");
                    Err(DeliveryError::Unavailable { attempts, source })
                }
                RetryOutcome::Cancelled { attempts } => {
                    self.metrics.record_error(topic, ErrorKind::Cancelled);
                    warn!(attempts, "Publish cancelled");
                    Err(DeliveryError::Cancelled)
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use booking_shared::models::events::BookingCancelledData;
    use booking_shared::EventType;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::time::Instant;
    use uuid::Uuid;

    fn producer(broker: &MemoryBroker) -> Producer {
        Producer::new(Arc::new(broker.clone()), Arc::new(Metrics::new().unwrap()))
    }

    fn cancelled_event(trace_id: Option<String>) -> Envelope<BookingCancelledData> {
        Envelope::new(
            EventType::BookingCancelled,
            "booking-service",
            trace_id,
            BookingCancelledData {
                booking_id: Uuid::new_v4(),
                reason: "plans changed".into(),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_sets_standard_headers() {
        let broker = MemoryBroker::new();
        let producer = producer(&broker);
        let event = cancelled_event(Some("trace-1".into()));

        producer
            .publish(&CancellationToken::new(), "booking-events", "b-1", &event)
            .await
            .unwrap();

        let written = broker.messages("booking-events").await;
        assert_eq!(written.len(), 1);
        let m = &written[0];
        assert_eq!(m.key, b"b-1");
        assert_eq!(m.headers.get_str(headers::CONTENT_TYPE), Some(headers::JSON));
        assert_eq!(m.headers.get_str(headers::MESSAGE_TYPE), Some("booking.cancelled"));
        assert_eq!(m.headers.get_str(headers::TRACE_ID), Some("trace-1"));

        let decoded: Envelope<BookingCancelledData> = serde_json::from_slice(&m.value).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(producer.metrics().produced_count("booking-events"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trace_header_omitted_without_trace() {
        let broker = MemoryBroker::new();
        producer(&broker)
            .publish(&CancellationToken::new(), "booking-events", "k", &cancelled_event(None))
            .await
            .unwrap();

        let written = broker.messages("booking-events").await;
        assert!(written[0].headers.get(headers::TRACE_ID).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_ack_is_unavailable_not_success() {
        let broker = MemoryBroker::with_partial_acks(1, 3);
        let producer = producer(&broker);
        let started = Instant::now();

        let err = producer
            .publish(&CancellationToken::new(), "booking-events", "k", &cancelled_event(None))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeliveryError::Unavailable {
                attempts: 3,
                source: TransportError::PartialAck { acked: 1, required: 3 }
            }
        ));
        assert_eq!(broker.write_attempts(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert!(broker.messages("booking-events").await.is_empty());
        assert_eq!(producer.metrics().produced_count("booking-events"), 0);
        assert_eq!(
            producer.metrics().error_count("booking-events", ErrorKind::Unavailable),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let broker = MemoryBroker::new();
        broker.fail_next_writes(2);
        let producer = producer(&broker);

        producer
            .publish(&CancellationToken::new(), "booking-events", "k", &cancelled_event(None))
            .await
            .unwrap();

        assert_eq!(broker.write_attempts(), 3);
        assert_eq!(broker.messages("booking-events").await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_aborts_publish() {
        let broker = MemoryBroker::new();
        broker.fail_next_writes(10);
        let producer = producer(&broker);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = producer
            .publish(&cancel, "booking-events", "k", &cancelled_event(None))
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Cancelled));
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(broker.write_attempts(), 1);
    }

    #[tokio::test]
    async fn test_serialization_fault_is_not_retried() {
        let broker = MemoryBroker::new();
        let producer = producer(&broker);
        // JSON object keys must be strings.
        let mut payload = BTreeMap::new();
        payload.insert(vec![1u8], 1u8);
        let event = Envelope::new(EventType::InventoryUpdated, "inventory", None, payload);

        let err = producer
            .publish(&CancellationToken::new(), "inventory-events", "k", &event)
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Serialization(_)));
        assert_eq!(broker.write_attempts(), 0);
        assert_eq!(
            producer.metrics().error_count("inventory-events", ErrorKind::Serialization),
            1
        );
    }
}
