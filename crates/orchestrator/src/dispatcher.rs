//! Background publisher for the transactional outbox.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use common::OrderId;
use messaging::{EventBus, MessageEnvelope, MessageId};
use store::{StateStore, StateStoreExt};

use crate::config::Config;
use crate::error::Result;

/// Default pause between outbox scans.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of entries fetched per scan.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Publishes persisted-but-unpublished outbox entries to the bus.
///
/// Entries are published in `sequence` order per order and marked
/// published only after the broker acknowledged them, so a crash
/// between publish and mark yields a redelivery, never a loss. The
/// envelope's message ID is the one persisted with the entry, giving
/// consumers a stable identity across such redeliveries.
pub struct OutboxDispatcher<S, B> {
    store: Arc<S>,
    bus: Arc<B>,
    poll_interval: Duration,
    batch_size: usize,
}

impl<S, B> OutboxDispatcher<S, B>
where
    S: StateStore,
    B: EventBus,
{
    /// Creates a new dispatcher.
    pub fn new(store: Arc<S>, bus: Arc<B>) -> Self {
        Self {
            store,
            bus,
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Creates a dispatcher wired from [`Config`].
    pub fn from_config(store: Arc<S>, bus: Arc<B>, config: &Config) -> Self {
        Self::new(store, bus)
            .with_poll_interval(config.outbox_poll_interval)
            .with_batch_size(config.outbox_batch_size)
    }

    /// Overrides the scan interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the scan batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Scans and publishes until the shutdown signal fires.
    #[tracing::instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        tracing::info!("outbox dispatcher started");
        loop {
            match self.process_batch().await {
                Ok(published) if published > 0 => {
                    tracing::debug!(published, "outbox batch dispatched");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "outbox scan failed, will retry");
                }
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("outbox dispatcher shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Publishes one batch of unpublished entries. Returns how many
    /// were published and marked.
    pub async fn process_batch(&self) -> Result<usize> {
        let entries = self.store.unpublished_entries(self.batch_size).await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let mut published = 0;
        // Once a publish for an order fails, its later entries must
        // wait, or they would overtake the failed one.
        let mut stalled: HashSet<OrderId> = HashSet::new();

        for entry in entries {
            if stalled.contains(&entry.order_id) {
                continue;
            }

            let envelope = MessageEnvelope::builder()
                .message_id(MessageId::from_uuid(entry.command.message_id))
                .topic(entry.command.topic.clone())
                .order_id(entry.order_id)
                .idempotency_key(entry.command.idempotency_key.clone())
                .payload_raw(entry.command.payload.clone())
                .build();

            match self.bus.publish(envelope).await {
                Ok(()) => {
                    self.store
                        .mark_published(entry.order_id, entry.sequence)
                        .await?;
                    metrics::counter!("outbox_published_total").increment(1);
                    published += 1;
                }
                Err(err) => {
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    tracing::warn!(
                        error = %err,
                        order_id = %entry.order_id,
                        sequence = entry.sequence,
                        topic = %entry.command.topic,
                        "publish failed, stalling order"
                    );
                    stalled.insert(entry.order_id);
                }
            }
        }

        Ok(published)
    }

    /// Publishes batches until no further progress is made. Intended
    /// for tests and draining on shutdown.
    pub async fn drain(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let published = self.process_batch().await?;
            if published == 0 {
                return Ok(total);
            }
            total += published;
        }
    }

    /// Returns true if unpublished entries remain.
    pub async fn has_pending(&self) -> Result<bool> {
        Ok(self.store.has_unpublished().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::IdempotencyKey;
    use messaging::InMemoryEventBus;
    use store::{InMemoryStateStore, OrderRecord, OutboxCommand, Version};
    use uuid::Uuid;

    fn make_command(topic: &str, order_id: OrderId) -> OutboxCommand {
        OutboxCommand {
            message_id: Uuid::new_v4(),
            topic: topic.to_string(),
            idempotency_key: IdempotencyKey::new(format!("{topic}:{order_id}")),
            payload: serde_json::json!({"order_id": order_id}),
        }
    }

    async fn seed_order(
        store: &InMemoryStateStore,
        order_id: OrderId,
        commands: Vec<OutboxCommand>,
    ) {
        let record =
            OrderRecord::from_state(order_id, &serde_json::json!({"state": "created"})).unwrap();
        store
            .save(record, Version::initial(), commands)
            .await
            .unwrap();
    }

    #[test]
    fn from_config_applies_outbox_settings() {
        let config = Config {
            outbox_poll_interval: Duration::from_millis(25),
            outbox_batch_size: 7,
            ..Config::default()
        };
        let dispatcher = OutboxDispatcher::from_config(
            Arc::new(InMemoryStateStore::new()),
            Arc::new(InMemoryEventBus::new()),
            &config,
        );
        assert_eq!(dispatcher.poll_interval, Duration::from_millis(25));
        assert_eq!(dispatcher.batch_size, 7);
    }

    #[tokio::test]
    async fn drain_publishes_in_sequence_order() {
        let store = Arc::new(InMemoryStateStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = OutboxDispatcher::new(store.clone(), bus.clone());

        let order_id = OrderId::new();
        seed_order(
            &store,
            order_id,
            vec![
                make_command("payment.charge", order_id),
                make_command("inventory.reserve", order_id),
            ],
        )
        .await;

        let published = dispatcher.drain().await.unwrap();
        assert_eq!(published, 2);
        assert!(!dispatcher.has_pending().await.unwrap());

        assert_eq!(bus.message_count("payment.charge").await, 1);
        assert_eq!(bus.message_count("inventory.reserve").await, 1);
    }

    #[tokio::test]
    async fn published_envelope_keeps_persisted_message_id() {
        let store = Arc::new(InMemoryStateStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = OutboxDispatcher::new(store.clone(), bus.clone());

        let order_id = OrderId::new();
        let command = make_command("payment.charge", order_id);
        let message_id = command.message_id;
        seed_order(&store, order_id, vec![command]).await;

        dispatcher.drain().await.unwrap();

        let messages = bus.topic_messages("payment.charge").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id.as_uuid(), message_id);
        assert_eq!(messages[0].order_id, order_id);
    }

    #[tokio::test]
    async fn restart_resumes_from_first_unpublished_entry() {
        let store = Arc::new(InMemoryStateStore::new());
        let bus = Arc::new(InMemoryEventBus::new());

        let order_id = OrderId::new();
        seed_order(
            &store,
            order_id,
            vec![
                make_command("payment.charge", order_id),
                make_command("inventory.reserve", order_id),
            ],
        )
        .await;

        // First entry was published before the crash.
        store.mark_published(order_id, 1).await.unwrap();

        // A fresh dispatcher over the same store picks up the rest.
        let dispatcher = OutboxDispatcher::new(store.clone(), bus.clone());
        let published = dispatcher.drain().await.unwrap();

        assert_eq!(published, 1);
        assert_eq!(bus.message_count("payment.charge").await, 0);
        assert_eq!(bus.message_count("inventory.reserve").await, 1);
    }
}
