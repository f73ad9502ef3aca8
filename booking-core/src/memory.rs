//! In-process broker for tests and single-binary runs without Kafka.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::message::{Message, Position};
use crate::transport::{MessageReader, MessageWriter, TransportError, WriteAck};

#[derive(Default)]
struct BrokerState {
    topics: Mutex<HashMap<String, Vec<Message>>>,
    appended: Notify,
    partial_ack: Option<(u16, u16)>,
    failures_left: AtomicU32,
    read_failures_left: AtomicU32,
    write_attempts: AtomicU32,
    closed: AtomicBool,
}

/// Single-partition, append-only topics held in memory.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write is acknowledged by only `acked` of `required` replicas and is not stored.
    pub fn with_partial_acks(acked: u16, required: u16) -> Self {
        Self {
            state: Arc::new(BrokerState {
                partial_ack: Some((acked, required)),
                ..Default::default()
            }),
        }
    }

    /// The next `n` writes fail with a broker error.
    pub fn fail_next_writes(&self, n: u32) {
        self.state.failures_left.store(n, Ordering::SeqCst);
    }

    /// The next `n` reads, across all readers, fail with a read error.
    pub fn fail_next_reads(&self, n: u32) {
        self.state.read_failures_left.store(n, Ordering::SeqCst);
    }

    pub fn write_attempts(&self) -> u32 {
        self.state.write_attempts.load(Ordering::SeqCst)
    }

    pub async fn messages(&self, topic: &str) -> Vec<Message> {
        self.state
            .topics
            .lock()
            .await
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Readers drain what is left, then report `Closed`.
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.appended.notify_waiters();
    }

    /// A reader starting at the beginning of each topic.
    pub fn reader(&self, topics: &[&str]) -> MemoryReader {
        MemoryReader {
            broker: self.clone(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            subscription: topics.join(","),
            cursors: HashMap::new(),
            consumed: HashMap::new(),
        }
    }

    fn take_injected_failure(&self) -> bool {
        take_one(&self.state.failures_left)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl MessageWriter for MemoryBroker {
    async fn write(&self, message: &Message) -> Result<WriteAck, TransportError> {
        self.state.write_attempts.fetch_add(1, Ordering::SeqCst);

        if self.state.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.take_injected_failure() {
            return Err(TransportError::Broker("injected write failure".into()));
        }
        if let Some((acked, required)) = self.state.partial_ack {
            return Ok(WriteAck::Partial { acked, required });
        }

        let mut topics = self.state.topics.lock().await;
        let log = topics.entry(message.topic.clone()).or_default();
        let mut stored = message.clone();
        stored.position = Some(Position {
            partition: 0,
            offset: log.len() as i64,
        });
        log.push(stored);
        drop(topics);

        self.state.appended.notify_waiters();
        Ok(WriteAck::Full)
    }
}

pub struct MemoryReader {
    broker: MemoryBroker,
    topics: Vec<String>,
    subscription: String,
    cursors: HashMap<String, usize>,
    consumed: HashMap<String, i64>,
}

impl MemoryReader {
    /// Highest offset marked consumed on `topic`.
    pub fn consumed_offset(&self, topic: &str) -> Option<i64> {
        self.consumed.get(topic).copied()
    }

    async fn next_available(&mut self) -> Option<Message> {
        let topics = self.broker.state.topics.lock().await;
        for topic in &self.topics {
            let cursor = self.cursors.entry(topic.clone()).or_insert(0);
            if let Some(message) = topics.get(topic).and_then(|log| log.get(*cursor)) {
                *cursor += 1;
                return Some(message.clone());
            }
        }
        None
    }
}

#[async_trait]
impl MessageReader for MemoryReader {
    async fn read(&mut self) -> Result<Message, TransportError> {
        if take_one(&self.broker.state.read_failures_left) {
            return Err(TransportError::Read("injected read failure".into()));
        }
        loop {
            let state = Arc::clone(&self.broker.state);
            let appended = state.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            if let Some(message) = self.next_available().await {
                return Ok(message);
            }
            if state.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            appended.await;
        }
    }

    fn mark_consumed(&mut self, message: &Message) -> Result<(), TransportError> {
        if let Some(position) = message.position {
            let entry = self.consumed.entry(message.topic.clone()).or_insert(-1);
            *entry = (*entry).max(position.offset);
        }
        Ok(())
    }

    fn subscription(&self) -> &str {
        &self.subscription
    }
}
