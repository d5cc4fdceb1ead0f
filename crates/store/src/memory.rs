use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use common::OrderId;

use crate::error::{Result, StoreError};
use crate::outbox::{OutboxCommand, OutboxEntry};
use crate::record::OrderRecord;
use crate::store::StateStore;
use crate::version::Version;

#[derive(Default)]
struct Inner {
    records: HashMap<OrderId, OrderRecord>,
    outbox: BTreeMap<(OrderId, i64), OutboxEntry>,
}

/// In-memory state store implementation for testing.
///
/// A single lock covers records and outbox, so every save is the same
/// atomic unit the PostgreSQL implementation provides with a
/// transaction.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStateStore {
    /// Creates a new empty in-memory state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored order records.
    pub async fn record_count(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Clears all records and outbox entries.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.records.clear();
        inner.outbox.clear();
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.records.get(&order_id).cloned())
    }

    async fn save(
        &self,
        mut record: OrderRecord,
        expected_version: Version,
        commands: Vec<OutboxCommand>,
    ) -> Result<Version> {
        let order_id = record.order_id;
        let mut inner = self.inner.write().await;

        let actual = inner
            .records
            .get(&order_id)
            .map(|r| r.version)
            .unwrap_or_else(Version::initial);

        if actual != expected_version {
            return Err(StoreError::Conflict {
                order_id,
                expected: expected_version,
                actual,
            });
        }

        let new_version = expected_version.next();
        record.version = new_version;
        record.updated_at = Utc::now();

        let last_sequence = inner
            .outbox
            .range((order_id, i64::MIN)..=(order_id, i64::MAX))
            .next_back()
            .map(|((_, seq), _)| *seq)
            .unwrap_or(0);

        for (offset, command) in commands.into_iter().enumerate() {
            let sequence = last_sequence + 1 + offset as i64;
            inner.outbox.insert(
                (order_id, sequence),
                OutboxEntry {
                    order_id,
                    sequence,
                    command,
                    published: false,
                    created_at: Utc::now(),
                },
            );
        }

        inner.records.insert(order_id, record);
        Ok(new_version)
    }

    async fn unpublished_entries(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .outbox
            .values()
            .filter(|entry| !entry.published)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, order_id: OrderId, sequence: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .outbox
            .get_mut(&(order_id, sequence))
            .ok_or(StoreError::EntryNotFound { order_id, sequence })?;
        entry.published = true;
        Ok(())
    }

    async fn outbox_for_order(&self, order_id: OrderId) -> Result<Vec<OutboxEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .outbox
            .range((order_id, i64::MIN)..=(order_id, i64::MAX))
            .map(|(_, entry)| entry.clone())
            .collect())
    }
}
