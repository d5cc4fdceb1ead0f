use common::OrderId;
use thiserror::Error;

use domain::OrderError;
use idempotency::IdempotencyError;
use messaging::MessagingError;
use store::StoreError;

/// How an error should be handled by the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Infrastructure hiccup; retry with backoff, never surface as a
    /// business failure.
    Transient,

    /// The message itself cannot be processed; redelivery will fail
    /// the same way until the bus dead-letters it.
    Poison,

    /// The stored aggregate violates its own invariants. The operation
    /// fails and the aggregate is left untouched for inspection.
    Invariant,
}

/// Errors raised while processing one inbound event.
///
/// Optimistic conflicts are retried inside the orchestrator and only
/// surface here once the retry budget is spent.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// State store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Idempotency store failure.
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),

    /// Event bus failure.
    #[error(transparent)]
    Messaging(#[from] MessagingError),

    /// The aggregate rejected the event.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// The envelope payload could not be decoded.
    #[error("payload decode error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Every save attempt lost the optimistic-concurrency race.
    #[error("gave up on order {order_id} after {attempts} conflicting save attempts")]
    ConflictRetriesExhausted { order_id: OrderId, attempts: u32 },
}

impl OrchestratorError {
    /// Classifies the error for the worker loop.
    pub fn class(&self) -> ErrorClass {
        match self {
            OrchestratorError::Store(StoreError::Database(_))
            | OrchestratorError::Idempotency(IdempotencyError::Unavailable(_))
            | OrchestratorError::Messaging(MessagingError::Unavailable(_))
            | OrchestratorError::ConflictRetriesExhausted { .. } => ErrorClass::Transient,

            OrchestratorError::Order(
                OrderError::CorrelationMismatch { .. } | OrderError::MissingPaymentAttempt(_),
            ) => ErrorClass::Invariant,

            _ => ErrorClass::Poison,
        }
    }

    /// Returns true if a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
