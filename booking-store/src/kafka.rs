//! rdkafka-backed transport for the delivery core.
//!
//! Writes wait for every in-sync replica (`acks=all`) with idempotence on.
//! Reads store offsets only after dispatch and let librdkafka commit the
//! stored offsets on `commit_interval_ms`.

use async_trait::async_trait;
use booking_core::{Headers, Message, MessageReader, MessageWriter, Position, TransportError, WriteAck};
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer as _, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Header, Headers as _, Message as _, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::app_config::KafkaConfig;

pub fn producer_config(cfg: &KafkaConfig) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &cfg.brokers)
        .set("acks", "all")
        .set("enable.idempotence", "true")
        .set("compression.type", "snappy")
        .set("message.timeout.ms", cfg.message_timeout_ms.to_string());
    config
}

pub fn consumer_config(cfg: &KafkaConfig) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &cfg.brokers)
        .set("group.id", &cfg.group_id)
        .set("enable.auto.commit", "true")
        .set("auto.commit.interval.ms", cfg.commit_interval_ms.to_string())
        .set("enable.auto.offset.store", "false")
        .set("auto.offset.reset", "latest")
        .set("session.timeout.ms", "6000")
        .set("enable.partition.eof", "false");
    config
}

#[derive(Clone)]
pub struct KafkaWriter {
    producer: FutureProducer,
    queue_timeout: Duration,
}

impl KafkaWriter {
    pub fn new(cfg: &KafkaConfig) -> Result<Self, KafkaError> {
        let producer: FutureProducer = producer_config(cfg).create()?;
        info!(brokers = %cfg.brokers, "Kafka producer created");
        Ok(Self {
            producer,
            queue_timeout: Duration::from_millis(cfg.message_timeout_ms),
        })
    }
}

pub(crate) fn to_owned_headers(headers: &Headers) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, (key, value)| {
            acc.insert(Header {
                key,
                value: Some(value),
            })
        })
}

fn write_error(err: KafkaError) -> TransportError {
    if matches!(
        err.rdkafka_error_code(),
        Some(RDKafkaErrorCode::NotEnoughReplicas | RDKafkaErrorCode::NotEnoughReplicasAfterAppend)
    ) {
        warn!(error = %err, "Write not acknowledged by all in-sync replicas");
    }
    TransportError::Broker(err.to_string())
}

#[async_trait]
impl MessageWriter for KafkaWriter {
    async fn write(&self, message: &Message) -> Result<WriteAck, TransportError> {
        let record = FutureRecord::to(&message.topic)
            .key(message.key.as_slice())
            .payload(message.value.as_slice())
            .headers(to_owned_headers(&message.headers))
            .timestamp(message.produced_at.timestamp_millis());

        match self
            .producer
            .send(record, Timeout::After(self.queue_timeout))
            .await
        {
            Ok(delivery) => {
                debug!(
                    topic = %message.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Delivered"
                );
                // acks=all: a successful delivery report means every ISR has it
                Ok(WriteAck::Full)
            }
            Err((err, _)) => Err(write_error(err)),
        }
    }
}

pub struct KafkaReader {
    consumer: StreamConsumer,
    subscription: String,
}

impl KafkaReader {
    pub fn new(cfg: &KafkaConfig, topics: &[String]) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = consumer_config(cfg).create()?;
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs)?;

        let subscription = topics.join(",");
        info!(group = %cfg.group_id, topics = %subscription, "Kafka consumer subscribed");
        Ok(Self {
            consumer,
            subscription,
        })
    }
}

fn to_message(m: &BorrowedMessage<'_>) -> Message {
    let mut headers = Headers::new();
    if let Some(raw) = m.headers() {
        for header in raw.iter() {
            headers.insert(header.key, header.value.unwrap_or_default());
        }
    }

    let produced_at = m
        .timestamp()
        .to_millis()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    let mut message = Message::new(
        m.topic(),
        m.key().unwrap_or_default(),
        m.payload().unwrap_or_default(),
    );
    message.headers = headers;
    message.produced_at = produced_at;
    message.position = Some(Position {
        partition: m.partition(),
        offset: m.offset(),
    });
    message
}

#[async_trait]
impl MessageReader for KafkaReader {
    async fn read(&mut self) -> Result<Message, TransportError> {
        match self.consumer.recv().await {
            Ok(m) => Ok(to_message(&m)),
            Err(err) => Err(TransportError::Read(err.to_string())),
        }
    }

    fn mark_consumed(&mut self, message: &Message) -> Result<(), TransportError> {
        let Some(position) = message.position else {
            return Err(TransportError::Broker(format!(
                "message on {} has no broker position",
                message.topic
            )));
        };
        // librdkafka stores offset + 1, the next offset to read
        self.consumer
            .store_offset(&message.topic, position.partition, position.offset)
            .map_err(|e| TransportError::Broker(e.to_string()))
    }

    fn subscription(&self) -> &str {
        &self.subscription
    }
}
