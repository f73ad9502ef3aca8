//! Seams between the delivery core and a concrete broker.
//!
//! [`MessageWriter`] appends one message and reports how many replicas took it.
//! [`MessageReader`] yields messages in order and records what was consumed.

use async_trait::async_trait;

use crate::message::Message;

/// Broker acknowledgement for a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAck {
    /// Every in-sync replica has the message.
    Full,
    Partial { acked: u16, required: u16 },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("broker error: {0}")]
    Broker(String),

    #[error("write acknowledged by {acked} of {required} required replicas")]
    PartialAck { acked: u16, required: u16 },

    #[error("read failed: {0}")]
    Read(String),

    #[error("transport closed")]
    Closed,
}

/// Write half of a broker connection. Shared by every producer clone.
#[async_trait]
pub trait MessageWriter: Send + Sync {
    async fn write(&self, message: &Message) -> Result<WriteAck, TransportError>;
}

/// Read half of a broker connection, owned by one consumer.
#[async_trait]
pub trait MessageReader: Send + Sync {
    /// Waits for the next message. Callers bound the wait themselves.
    async fn read(&mut self) -> Result<Message, TransportError>;

    /// Records that `message` is done with. Progress is committed later, on an interval.
    fn mark_consumed(&mut self, message: &Message) -> Result<(), TransportError>;

    /// Topics this reader is subscribed to, for logs and metric labels.
    fn subscription(&self) -> &str;
}
