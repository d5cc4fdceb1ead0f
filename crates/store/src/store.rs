use async_trait::async_trait;

use common::OrderId;

use crate::outbox::{OutboxCommand, OutboxEntry};
use crate::record::OrderRecord;
use crate::version::Version;
use crate::{Result, StoreError};

/// Core trait for state store implementations.
///
/// A state store persists one record per order under optimistic
/// concurrency, together with the order's outbox. All implementations
/// must be thread-safe (Send + Sync).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the record for an order.
    ///
    /// Returns None if the order has never been saved.
    async fn load(&self, order_id: OrderId) -> Result<Option<OrderRecord>>;

    /// Persists a record and appends its outbox commands in one atomic
    /// unit.
    ///
    /// The stored version must equal `expected_version` (use
    /// `Version::initial()` for a new order); otherwise the save fails
    /// with `Conflict` and nothing is written. On success the record is
    /// stored at `expected_version.next()`, the commands receive
    /// consecutive per-order sequence numbers, and the new version is
    /// returned.
    async fn save(
        &self,
        record: OrderRecord,
        expected_version: Version,
        commands: Vec<OutboxCommand>,
    ) -> Result<Version>;

    /// Returns up to `limit` unpublished outbox entries, ordered by
    /// `sequence` within each order.
    async fn unpublished_entries(&self, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// Marks an outbox entry as published. Called only after the
    /// broker acknowledged the publish.
    async fn mark_published(&self, order_id: OrderId, sequence: i64) -> Result<()>;

    /// Returns all outbox entries for an order in sequence order,
    /// published or not.
    async fn outbox_for_order(&self, order_id: OrderId) -> Result<Vec<OutboxEntry>>;
}

/// Extension trait providing convenience methods for state stores.
#[async_trait]
pub trait StateStoreExt: StateStore {
    /// Loads the record for an order, failing if it does not exist.
    async fn load_existing(&self, order_id: OrderId) -> Result<OrderRecord> {
        self.load(order_id)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))
    }

    /// Returns true if any unpublished entries remain.
    async fn has_unpublished(&self) -> Result<bool> {
        Ok(!self.unpublished_entries(1).await?.is_empty())
    }
}

impl<T: StateStore + ?Sized> StateStoreExt for T {}
