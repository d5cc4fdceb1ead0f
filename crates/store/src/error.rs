use thiserror::Error;

use common::OrderId;

use crate::version::Version;

/// Errors that can occur when interacting with the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrency conflict occurred when saving a record: the
    /// expected version did not match the stored version. The caller
    /// must reload the record and re-decide.
    #[error("concurrency conflict for order {order_id}: expected version {expected}, found {actual}")]
    Conflict {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// The order has never been saved.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// The referenced outbox entry does not exist.
    #[error("outbox entry not found: order {order_id}, sequence {sequence}")]
    EntryNotFound { order_id: OrderId, sequence: i64 },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
