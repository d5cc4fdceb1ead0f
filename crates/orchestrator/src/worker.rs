//! Worker loop consuming one inbound topic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use idempotency::IdempotencyStore;
use messaging::{Delivery, EventBus, RetryPolicy};
use store::StateStore;

use crate::config::Config;
use crate::error::{ErrorClass, Result};
use crate::orchestrator::{HandleOutcome, Orchestrator};

/// Default bound on one event's processing time.
pub const DEFAULT_HANDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumes one topic for a consumer group and feeds each delivery to
/// the orchestrator.
///
/// Acknowledgment policy: `Applied`, `Discarded`, and `Duplicate` all
/// ack (the work is done or provably already done). `InFlight` and
/// errors nack after a backoff pause; the bus redelivers, and after
/// the configured number of attempts parks the message in the
/// dead-letter destination. Processing is bounded by a timeout so a
/// stuck store or provider never wedges the worker.
pub struct Worker<S, I, B> {
    orchestrator: Arc<Orchestrator<S, I>>,
    bus: Arc<B>,
    consumer_group: String,
    retry: RetryPolicy,
    handle_timeout: Duration,
}

impl<S, I, B> Worker<S, I, B>
where
    S: StateStore,
    I: IdempotencyStore,
    B: EventBus,
{
    /// Creates a new worker.
    pub fn new(
        orchestrator: Arc<Orchestrator<S, I>>,
        bus: Arc<B>,
        consumer_group: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            bus,
            consumer_group: consumer_group.into(),
            retry: RetryPolicy::default(),
            handle_timeout: DEFAULT_HANDLE_TIMEOUT,
        }
    }

    /// Creates a worker wired from [`Config`].
    pub fn from_config(
        orchestrator: Arc<Orchestrator<S, I>>,
        bus: Arc<B>,
        config: &Config,
    ) -> Self {
        Self::new(orchestrator, bus, config.consumer_group.clone())
            .with_handle_timeout(config.handle_timeout)
    }

    /// Overrides the backoff policy used between redelivery nacks.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the per-event processing timeout.
    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }

    /// Consumes the topic until the shutdown signal fires.
    #[tracing::instrument(skip(self, shutdown), fields(group = %self.consumer_group))]
    pub async fn run(&self, topic: &str, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut subscription = self.bus.subscribe(topic, &self.consumer_group).await?;
        tracing::info!("worker started");

        loop {
            let delivery = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("worker shutting down");
                    return Ok(());
                }
                delivery = subscription.next() => delivery?,
            };
            self.handle_delivery(delivery).await;
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let attempt = delivery.attempt;
        let result = tokio::time::timeout(
            self.handle_timeout,
            self.orchestrator.handle(&delivery.envelope),
        )
        .await;

        match result {
            Ok(Ok(HandleOutcome::Applied { .. }))
            | Ok(Ok(HandleOutcome::Discarded { .. }))
            | Ok(Ok(HandleOutcome::Duplicate(_))) => {
                if let Err(err) = delivery.ack().await {
                    tracing::warn!(error = %err, "ack failed");
                }
            }
            Ok(Ok(HandleOutcome::InFlight)) => {
                self.reject(delivery, "reservation in flight", attempt).await;
            }
            Ok(Err(err)) => {
                match err.class() {
                    ErrorClass::Transient => {
                        tracing::warn!(error = %err, attempt, "transient failure, will retry")
                    }
                    ErrorClass::Poison => {
                        metrics::counter!("worker_poison_messages_total").increment(1);
                        tracing::error!(error = %err, attempt, "poison message")
                    }
                    ErrorClass::Invariant => {
                        metrics::counter!("worker_invariant_violations_total").increment(1);
                        tracing::error!(error = %err, attempt, "aggregate invariant violation")
                    }
                }
                self.reject(delivery, &err.to_string(), attempt).await;
            }
            Err(_) => {
                metrics::counter!("worker_timeouts_total").increment(1);
                tracing::warn!(attempt, "processing timed out");
                self.reject(delivery, "processing timed out", attempt).await;
            }
        }
    }

    /// Pauses before nacking so redelivery is paced by the backoff
    /// policy rather than arriving immediately.
    async fn reject(&self, delivery: Delivery, reason: &str, attempt: u32) {
        tokio::time::sleep(self.retry.delay_for(attempt)).await;
        if let Err(err) = delivery.nack(reason).await {
            tracing::warn!(error = %err, "nack failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::events::CheckoutRequestedData;
    use domain::value_objects::{LineItem, Money};
    use domain::{OrderEvent, OrderState, topics};
    use idempotency::InMemoryIdempotencyStore;
    use messaging::{InMemoryEventBus, MessageEnvelope};
    use store::{InMemoryStateStore, StateStore};

    fn checkout_envelope(order_id: common::OrderId) -> MessageEnvelope {
        let event = OrderEvent::CheckoutRequested(CheckoutRequestedData {
            order_id,
            line_items: vec![LineItem::new("SKU-X", 1, Money::from_dollars(10))],
        });
        MessageEnvelope::builder()
            .topic(topics::CHECKOUT_REQUESTED)
            .order_id(order_id)
            .idempotency_key(format!("evt:checkout:{order_id}").into())
            .payload(&event)
            .unwrap()
            .build()
    }

    #[test]
    fn from_config_applies_group_and_timeout() {
        let config = Config {
            consumer_group: "audit".to_string(),
            handle_timeout: Duration::from_secs(2),
            ..Config::default()
        };
        let store = Arc::new(InMemoryStateStore::new());
        let idempotency = Arc::new(InMemoryIdempotencyStore::default());
        let orchestrator = Arc::new(Orchestrator::from_config(store, idempotency, &config));

        let worker = Worker::from_config(orchestrator, Arc::new(InMemoryEventBus::new()), &config);
        assert_eq!(worker.consumer_group, "audit");
        assert_eq!(worker.handle_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn worker_processes_and_acks_a_delivery() {
        let bus = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(InMemoryStateStore::new());
        let idempotency = Arc::new(InMemoryIdempotencyStore::default());
        let orchestrator = Arc::new(Orchestrator::new(store.clone(), idempotency));

        let worker = Worker::new(orchestrator, bus.clone(), "orchestrator");
        let (shutdown_tx, _) = broadcast::channel(1);

        let order_id = common::OrderId::new();
        bus.publish(checkout_envelope(order_id)).await.unwrap();

        let handle = {
            let rx = shutdown_tx.subscribe();
            tokio::spawn(async move { worker.run(topics::CHECKOUT_REQUESTED, rx).await })
        };

        // Wait until the transition is visible.
        for _ in 0..50 {
            if store.load(order_id).await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let record = store.load(order_id).await.unwrap().unwrap();
        let order: domain::Order = record.deserialize_state().unwrap();
        assert_eq!(order.state, OrderState::PaymentPending);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_message_ends_up_dead_lettered() {
        let bus = Arc::new(InMemoryEventBus::with_max_delivery_attempts(2));
        let store = Arc::new(InMemoryStateStore::new());
        let idempotency = Arc::new(InMemoryIdempotencyStore::default());
        let orchestrator = Arc::new(Orchestrator::new(store, idempotency));

        let worker = Worker::new(orchestrator, bus.clone(), "orchestrator")
            .with_retry_policy(RetryPolicy::without_jitter(
                Duration::from_millis(1),
                Duration::from_millis(5),
            ));
        let (shutdown_tx, _) = broadcast::channel(1);

        let envelope = MessageEnvelope::builder()
            .topic(topics::CHECKOUT_REQUESTED)
            .order_id(common::OrderId::new())
            .idempotency_key("evt:poison".into())
            .payload_raw(serde_json::json!({"type": "Garbage"}))
            .build();
        bus.publish(envelope).await.unwrap();

        let handle = {
            let rx = shutdown_tx.subscribe();
            tokio::spawn(async move { worker.run(topics::CHECKOUT_REQUESTED, rx).await })
        };

        for _ in 0..100 {
            if !bus.dead_letters(topics::CHECKOUT_REQUESTED).await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let dead = bus.dead_letters(topics::CHECKOUT_REQUESTED).await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
