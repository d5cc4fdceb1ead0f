use common::OrderId;
use thiserror::Error;

/// Errors raised by the order aggregate.
///
/// These are invariant violations, not business declines: a declined
/// payment or failed reservation is a normal state transition, while
/// these errors mean the input or the stored aggregate is inconsistent
/// and must be surfaced rather than acted on.
#[derive(Debug, Error)]
pub enum OrderError {
    /// A checkout was requested with no line items.
    #[error("checkout for order {0} has no line items")]
    EmptyOrder(OrderId),

    /// A line item has a zero quantity.
    #[error("line item {sku} in order {order_id} has zero quantity")]
    InvalidQuantity { order_id: OrderId, sku: String },

    /// A line item has a non-positive unit price.
    #[error("line item {sku} in order {order_id} has non-positive unit price")]
    InvalidPrice { order_id: OrderId, sku: String },

    /// The order total does not fit in an `i64` cent count.
    #[error("order {0} total overflows the representable amount")]
    TotalOverflow(OrderId),

    /// An event carried a different order ID than the aggregate it was
    /// routed to.
    #[error("event for order {got} routed to aggregate {expected}")]
    CorrelationMismatch { expected: OrderId, got: OrderId },

    /// A refund was required but no payment attempt was ever recorded.
    #[error("order {0} requires a refund but has no payment attempt on record")]
    MissingPaymentAttempt(OrderId),
}

/// Result type for aggregate operations.
pub type Result<T> = std::result::Result<T, OrderError>;
