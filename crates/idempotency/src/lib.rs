//! Idempotency store for the checkout saga.
//!
//! Deduplicates inbound commands, provider events, and payment attempts
//! by a caller-supplied key. The store is what makes redelivered
//! messages and retried provider callbacks safe to reprocess: the first
//! caller reserves the key, does its work, and records the result;
//! every later caller with the same key gets the cached result back and
//! performs no side effect.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{IdempotencyError, Result};
pub use memory::InMemoryIdempotencyStore;
pub use store::{CheckOutcome, IdempotencyConfig, IdempotencyStore};
