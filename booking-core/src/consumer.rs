use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::{DeliveryError, ErrorKind};
use crate::handler::{resolve_message_type, HandlerError, HandlerRegistry, MessageTypeSource};
use crate::message::{headers, Message};
use crate::metrics::Metrics;
use crate::producer::Producer;
use crate::retry::{retry_cancellable, sleep_or_cancel, RetryOutcome, RetryPolicy};
use crate::transport::{MessageReader, TransportError};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub retry: RetryPolicy,
    /// Upper bound on one broker read, so cancellation is noticed on idle topics.
    pub read_timeout: Duration,
    /// Pause after a failed read before trying again.
    pub read_error_pause: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            read_timeout: Duration::from_secs(5),
            read_error_pause: Duration::from_secs(1),
        }
    }
}

/// What happens to a message that failed for good.
#[derive(Clone, Default)]
pub enum ExhaustedPolicy {
    /// Log, count and move on.
    #[default]
    Drop,
    /// Also copy the message to a dead-letter topic.
    Forward { topic: String, producer: Producer },
}

/// Reads one subscription sequentially and dispatches each message by type.
pub struct Consumer<R> {
    reader: R,
    registry: Arc<HandlerRegistry>,
    metrics: Arc<Metrics>,
    config: ConsumerConfig,
    exhausted: ExhaustedPolicy,
}

impl<R: MessageReader> Consumer<R> {
    pub fn new(reader: R, registry: Arc<HandlerRegistry>, metrics: Arc<Metrics>) -> Self {
        Self {
            reader,
            registry,
            metrics,
            config: ConsumerConfig::default(),
            exhausted: ExhaustedPolicy::Drop,
        }
    }

    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_exhausted_policy(mut self, policy: ExhaustedPolicy) -> Self {
        self.exhausted = policy;
        self
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Runs until `cancel` fires or the transport closes.
    ///
    /// Message N+1 is not read before message N, retries included, is done.
    /// A message whose dispatch was cancelled is not marked consumed.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), DeliveryError> {
        info!(
            subscription = self.reader.subscription(),
            handlers = ?self.registry.message_types(),
            "Consumer started"
        );

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                read = tokio::time::timeout(self.config.read_timeout, self.reader.read()) => read,
            };

            let message = match read {
                Err(_elapsed) => continue,
                Ok(Ok(message)) => message,
                Ok(Err(TransportError::Closed)) => {
                    info!(subscription = self.reader.subscription(), "Transport closed");
                    break;
                }
                Ok(Err(err)) => {
                    self.metrics
                        .record_error(self.reader.subscription(), ErrorKind::Unavailable);
                    warn!(error = %err, "Failed to read message");
                    if sleep_or_cancel(&cancel, self.config.read_error_pause).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            if let Err(DeliveryError::Cancelled) = self.dispatch(&cancel, &message).await {
                break;
            }

            if let Err(err) = self.reader.mark_consumed(&message) {
                warn!(topic = %message.topic, error = %err, "Failed to store consumed offset");
            }
        }

        info!(subscription = self.reader.subscription(), "Consumer stopped");
        Ok(())
    }

    /// Resolves and invokes the handler for one message, retrying transient failures.
    ///
    /// Returns the number of handler attempts on success.
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        message: &Message,
    ) -> Result<u32, DeliveryError> {
        let resolved = resolve_message_type(message);
        let span = info_span!(
            "kafka.consume",
            topic = %message.topic,
            key = %message.key_str(),
            message_type = resolved.message_type().unwrap_or_default(),
            offset = message.position.map(|p| p.offset),
        );

        async {
            let result = self.invoke(cancel, message, &resolved).await;
            let topic = message.topic.as_str();

            match &result {
                Ok(attempts) => {
                    self.metrics.record_consumed(topic);
                    debug!(attempts, "Message handled");
                }
                Err(err) => {
                    self.metrics.record_error(topic, err.kind());
                    match err {
                        DeliveryError::HandlerNotFound(_) => {
                            warn!(source = ?resolved, "No handler for message, skipping")
                        }
                        DeliveryError::Cancelled => info!("Dispatch cancelled"),
                        other => {
                            error!(error = %other, attempts = other.attempts(), "Message failed");
                            self.on_exhausted(cancel, message, other).await;
                        }
                    }
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn invoke(
        &self,
        cancel: &CancellationToken,
        message: &Message,
        resolved: &MessageTypeSource,
    ) -> Result<u32, DeliveryError> {
        let message_type = resolved
            .message_type()
            .ok_or(DeliveryError::HandlerNotFound(None))?;
        let handler = self
            .registry
            .resolve(message_type)
            .ok_or_else(|| DeliveryError::HandlerNotFound(Some(message_type.to_string())))?;

        let handler = handler.as_ref();
        let metrics = self.metrics.as_ref();
        let topic = message.topic.as_str();

        let outcome = retry_cancellable(
            &self.config.retry,
            cancel,
            HandlerError::is_retryable,
            |attempt| async move {
                let started = Instant::now();
                let result = handler.handle(message).await;
                metrics.observe_handler(topic, message_type, started.elapsed().as_secs_f64());
                if let Err(err) = &result {
                    warn!(attempt, error = %err, "Handler attempt failed");
                }
                result
            },
        )
        .await;

        match outcome {
            RetryOutcome::Succeeded { attempts, .. } => Ok(attempts),
            RetryOutcome::Exhausted { last, attempts } => Err(DeliveryError::HandlerFailure {
                attempts,
                source: last,
            }),
            RetryOutcome::Aborted { error, attempts } => Err(match error {
                HandlerError::Conflict(reason) => DeliveryError::Conflict(reason),
                HandlerError::Malformed(reason) => DeliveryError::Malformed(reason),
                failed @ HandlerError::Failed(_) => DeliveryError::HandlerFailure {
                    attempts,
                    source: failed,
                },
            }),
            RetryOutcome::Cancelled { .. } => Err(DeliveryError::Cancelled),
        }
    }

    async fn on_exhausted(&self, cancel: &CancellationToken, message: &Message, err: &DeliveryError) {
        let ExhaustedPolicy::Forward { topic, producer } = &self.exhausted else {
            return;
        };

        let mut dead = message.clone();
        dead.topic = topic.clone();
        dead.position = None;
        dead.headers.insert(headers::ORIGINAL_TOPIC, message.topic.as_str());
        dead.headers.insert(headers::FAILURE_REASON, err.kind().as_str());
        dead.headers.insert(headers::ATTEMPTS, err.attempts().to_string());

        match producer.publish_message(cancel, dead).await {
            Ok(()) => info!(dead_letter_topic = %topic, "Forwarded failed message"),
            Err(forward_err) => {
                error!(dead_letter_topic = %topic, error = %forward_err, "Failed to forward failed message")
            }
        }
    }
}
