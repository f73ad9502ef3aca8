//! Broker-neutral message: topic, key, payload bytes and ordered headers.
//!
//! `position` is set only on messages that came from a reader.

use chrono::{DateTime, Utc};

/// Header names understood by producers and consumers.
pub mod headers {
    pub const CONTENT_TYPE: &str = "content-type";
    pub const MESSAGE_TYPE: &str = "message-type";
    pub const TRACE_ID: &str = "trace-id";

    pub const ORIGINAL_TOPIC: &str = "x-original-topic";
    pub const FAILURE_REASON: &str = "x-failure-reason";
    pub const ATTEMPTS: &str = "x-attempts";

    pub const JSON: &str = "application/json";
}

/// Ordered header list. Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, Vec<u8>)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Header value as UTF-8, `None` when missing or not valid text.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Where a consumed message sits in its topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub partition: i32,
    pub offset: i64,
}

/// Transport unit written to and read from the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub headers: Headers,
    pub produced_at: DateTime<Utc>,
    /// Set by readers; `None` on outbound messages.
    pub position: Option<Position>,
}

impl Message {
    pub fn new(topic: impl Into<String>, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            value: value.into(),
            headers: Headers::new(),
            produced_at: Utc::now(),
            position: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn key_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
}
