use common::IdempotencyKey;
use thiserror::Error;

/// Errors that can occur when interacting with the idempotency store.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// `record_result` was called for a key that holds no reservation.
    /// The reservation either expired or was never taken.
    #[error("no in-flight reservation for key '{0}'")]
    NotReserved(IdempotencyKey),

    /// The backing store could not be reached.
    #[error("idempotency store unavailable: {0}")]
    Unavailable(String),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for idempotency store operations.
pub type Result<T> = std::result::Result<T, IdempotencyError>;
