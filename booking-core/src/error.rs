use crate::handler::HandlerError;
use crate::transport::TransportError;

/// Coarse failure class, used as the `kind` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Serialization,
    Unavailable,
    HandlerNotFound,
    HandlerFailure,
    Conflict,
    Malformed,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Serialization => "serialization",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::HandlerNotFound => "handler_not_found",
            ErrorKind::HandlerFailure => "handler_failure",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Retried inside the producer/consumer loops before surfacing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Unavailable | ErrorKind::HandlerFailure)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("broker unavailable after {attempts} attempt(s): {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("no handler registered for message type {}", .0.as_deref().unwrap_or("<unresolved>"))]
    HandlerNotFound(Option<String>),

    #[error("handler failed after {attempts} attempt(s): {source}")]
    HandlerFailure {
        attempts: u32,
        #[source]
        source: HandlerError,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("delivery cancelled")]
    Cancelled,
}

impl DeliveryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeliveryError::Serialization(_) => ErrorKind::Serialization,
            DeliveryError::Unavailable { .. } => ErrorKind::Unavailable,
            DeliveryError::HandlerNotFound(_) => ErrorKind::HandlerNotFound,
            DeliveryError::HandlerFailure { .. } => ErrorKind::HandlerFailure,
            DeliveryError::Conflict(_) => ErrorKind::Conflict,
            DeliveryError::Malformed(_) => ErrorKind::Malformed,
            DeliveryError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Attempts made before giving up; permanent failures stop at the first.
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryError::Unavailable { attempts, .. }
            | DeliveryError::HandlerFailure { attempts, .. } => *attempts,
            DeliveryError::HandlerNotFound(_) | DeliveryError::Serialization(_) => 0,
            _ => 1,
        }
    }
}
