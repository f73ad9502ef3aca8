use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::handler::{HandlerError, MessageHandler};
use crate::message::Message;

/// Remembers which envelope ids a handler has already completed.
#[async_trait]
pub trait ProcessedEvents: Send + Sync {
    async fn is_processed(&self, event_id: Uuid) -> anyhow::Result<bool>;

    async fn mark_processed(&self, event_id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: ProcessedEvents + ?Sized> ProcessedEvents for Arc<T> {
    async fn is_processed(&self, event_id: Uuid) -> anyhow::Result<bool> {
        (**self).is_processed(event_id).await
    }

    async fn mark_processed(&self, event_id: Uuid) -> anyhow::Result<()> {
        (**self).mark_processed(event_id).await
    }
}

#[derive(Default)]
pub struct InMemoryProcessedEvents {
    seen: RwLock<HashSet<Uuid>>,
}

impl InMemoryProcessedEvents {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedEvents for InMemoryProcessedEvents {
    async fn is_processed(&self, event_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.seen.read().await.contains(&event_id))
    }

    async fn mark_processed(&self, event_id: Uuid) -> anyhow::Result<()> {
        self.seen.write().await.insert(event_id);
        Ok(())
    }
}

#[derive(Deserialize)]
struct EnvelopeId {
    id: Uuid,
}

/// Skips envelopes whose `id` the inner handler already completed.
///
/// An id is recorded only after the inner handler succeeds, so a crash
/// between the two still redelivers; the inner handler must stay idempotent
/// on its own for that window.
pub struct Idempotent<H, S> {
    inner: H,
    store: S,
}

impl<H, S> Idempotent<H, S>
where
    H: MessageHandler,
    S: ProcessedEvents,
{
    pub fn new(inner: H, store: S) -> Self {
        Self { inner, store }
    }
}

#[async_trait]
impl<H, S> MessageHandler for Idempotent<H, S>
where
    H: MessageHandler,
    S: ProcessedEvents,
{
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        let EnvelopeId { id } = serde_json::from_slice(&message.value)
            .map_err(|e| HandlerError::Malformed(format!("envelope without usable id: {e}")))?;

        if self.store.is_processed(id).await? {
            tracing::debug!(event_id = %id, "Skipping already processed event");
            return Ok(());
        }

        self.inner.handle(message).await?;

        if let Err(err) = self.store.mark_processed(id).await {
            tracing::warn!(event_id = %id, error = %err, "Failed to record processed event");
        }
        Ok(())
    }
}
