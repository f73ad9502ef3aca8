use async_trait::async_trait;
use booking_shared::Envelope;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::message::{headers, Message};

/// Outcome of a failed handler invocation.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Transient; the consumer retries with backoff.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// A domain invariant refused the change. Never retried.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The message can never be processed as sent. Never retried.
    #[error("malformed message: {0}")]
    Malformed(String),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Failed(_))
    }
}

/// Processes one message type. Handlers must tolerate redelivery of the same event.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}

/// Adapts an async closure into a [`MessageHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler(f)
}

pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        (self.0)(message.clone()).await
    }
}

/// Decodes the message value as an envelope carrying `T`.
///
/// Missing `id`, `type` or `data` and unknown event types are `Malformed`.
pub fn decode<T: DeserializeOwned>(message: &Message) -> Result<Envelope<T>, HandlerError> {
    serde_json::from_slice(&message.value).map_err(|e| {
        HandlerError::Malformed(format!("invalid envelope on {}: {e}", message.topic))
    })
}

/// Message type string to handler. Populated at start-up, read-only afterwards.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `message_type`, replacing any previous one.
    pub fn register<H>(&mut self, message_type: impl Into<String>, handler: H) -> &mut Self
    where
        H: MessageHandler + 'static,
    {
        self.register_arc(message_type, Arc::new(handler))
    }

    pub fn register_arc(
        &mut self,
        message_type: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> &mut Self {
        let message_type = message_type.into();
        if self.handlers.insert(message_type.clone(), handler).is_some() {
            tracing::warn!(message_type = %message_type, "Replaced existing handler");
        }
        self
    }

    pub fn with<H>(mut self, message_type: impl Into<String>, handler: H) -> Self
    where
        H: MessageHandler + 'static,
    {
        self.register(message_type, handler);
        self
    }

    pub fn resolve(&self, message_type: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.get(message_type).cloned()
    }

    pub fn message_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Where the dispatch key of a message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTypeSource {
    FromHeader(String),
    FromPayload(String),
    Unresolved,
}

impl MessageTypeSource {
    pub fn message_type(&self) -> Option<&str> {
        match self {
            MessageTypeSource::FromHeader(t) | MessageTypeSource::FromPayload(t) => Some(t),
            MessageTypeSource::Unresolved => None,
        }
    }
}

#[derive(Deserialize)]
struct PayloadType {
    #[serde(rename = "type")]
    event_type: Option<String>,
}

/// Prefers the `message-type` header, then the payload's top-level `type` field.
pub fn resolve_message_type(message: &Message) -> MessageTypeSource {
    if let Some(t) = message
        .headers
        .get_str(headers::MESSAGE_TYPE)
        .filter(|t| !t.is_empty())
    {
        return MessageTypeSource::FromHeader(t.to_string());
    }

    match serde_json::from_slice::<PayloadType>(&message.value) {
        Ok(PayloadType {
            event_type: Some(t),
        }) if !t.is_empty() => MessageTypeSource::FromPayload(t),
        _ => MessageTypeSource::Unresolved,
    }
}
