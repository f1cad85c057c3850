//! Hub errors

use sse_common::AppError;

/// Errors returned by hub operations
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Consumer already registered: {0}")]
    DuplicateConsumer(String),

    #[error("Transport does not support streaming")]
    StreamingUnsupported,

    #[error("Hub is shutting down")]
    ShuttingDown,

    #[error("Hub is closed")]
    Closed,

    #[error("Inbound event queue is full")]
    QueueFull,
}

impl From<HubError> for AppError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::DuplicateConsumer(_) => Self::Conflict(err.to_string()),
            HubError::StreamingUnsupported => Self::Unsupported(err.to_string()),
            HubError::ShuttingDown | HubError::Closed | HubError::QueueFull => {
                Self::Unavailable(err.to_string())
            }
        }
    }
}
