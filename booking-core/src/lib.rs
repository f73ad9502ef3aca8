//! Event delivery: a retrying [`Producer`], a sequential [`Consumer`] that dispatches
//! through a [`HandlerRegistry`], and the transport seam both sit on.

pub mod consumer;
pub mod error;
pub mod handler;
pub mod idempotency;
pub mod memory;
pub mod message;
pub mod metrics;
pub mod producer;
pub mod retry;
pub mod transport;

pub use consumer::{Consumer, ConsumerConfig, ExhaustedPolicy};
pub use error::{DeliveryError, ErrorKind};
pub use handler::{
    decode, handler_fn, resolve_message_type, HandlerError, HandlerRegistry, MessageHandler,
    MessageTypeSource,
};
pub use idempotency::{Idempotent, InMemoryProcessedEvents, ProcessedEvents};
pub use memory::{MemoryBroker, MemoryReader};
pub use message::{headers, Headers, Message, Position};
pub use metrics::Metrics;
pub use producer::Producer;
pub use retry::RetryPolicy;
pub use transport::{MessageReader, MessageWriter, TransportError, WriteAck};

pub use tokio_util::sync::CancellationToken;
