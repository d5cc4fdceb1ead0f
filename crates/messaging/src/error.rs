use thiserror::Error;

/// Errors that can occur when interacting with the event bus.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The broker could not be reached or refused the operation.
    /// Callers retry with backoff; the failure is never surfaced as a
    /// business error.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// The subscription's consumer group was closed or is no longer valid.
    #[error("subscription closed for topic '{topic}', group '{group}'")]
    SubscriptionClosed { topic: String, group: String },

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
