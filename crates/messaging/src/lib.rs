//! Event bus client for the checkout saga.
//!
//! This crate provides the messaging contract between the orchestrator
//! and its external collaborators: at-least-once publish/subscribe with
//! durable, replayable consumer groups and explicit acknowledgment.
//!
//! Consumers must be idempotent — every envelope carries an
//! idempotency key, and a message that keeps failing is moved to a
//! dead-letter destination instead of being dropped.

pub mod backoff;
pub mod bus;
pub mod envelope;
pub mod error;
pub mod memory;

pub use backoff::RetryPolicy;
pub use bus::{AckHandle, DeadLetter, Delivery, EventBus, Subscription};
pub use envelope::{MessageEnvelope, MessageEnvelopeBuilder, MessageId};
pub use error::{MessagingError, Result};
pub use memory::InMemoryEventBus;
