//! Durable state for the checkout saga.
//!
//! One `OrderRecord` per order, guarded by an optimistic-concurrency
//! version, plus the transactional outbox: every accepted transition
//! persists the new aggregate state and its outbound commands in one
//! atomic unit, so a crash can neither lose a decided command nor
//! publish one whose transition was rolled back.

pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod record;
pub mod store;
pub mod version;

pub use error::{Result, StoreError};
pub use memory::InMemoryStateStore;
pub use outbox::{OutboxCommand, OutboxEntry};
pub use postgres::PostgresStateStore;
pub use record::OrderRecord;
pub use store::{StateStore, StateStoreExt};
pub use version::Version;
