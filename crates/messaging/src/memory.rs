use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, RwLock};

use crate::bus::{AckHandle, DeadLetter, Delivery, EventBus, Subscription};
use crate::envelope::MessageEnvelope;
use crate::error::{MessagingError, Result};

/// Default number of delivery attempts before a message is dead-lettered.
pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 5;

#[derive(Default)]
struct GroupState {
    /// Index of the next never-delivered message in the topic log.
    next_index: usize,

    /// Delivered but unacknowledged messages, with attempts so far.
    pending: HashMap<usize, u32>,

    /// Indices queued for redelivery after a nack or resubscribe.
    redeliver: VecDeque<usize>,
}

#[derive(Default)]
struct BusState {
    /// Append-only message log per topic. The log is the durable,
    /// replayable record consumer groups read from.
    topics: HashMap<String, Vec<MessageEnvelope>>,

    /// Consumer group cursors, keyed by (topic, group).
    groups: HashMap<(String, String), GroupState>,

    /// Parked messages per topic.
    dead_letters: HashMap<String, Vec<DeadLetter>>,
}

struct Inner {
    state: RwLock<BusState>,
    notify: Notify,
    max_delivery_attempts: u32,
}

/// In-memory event bus implementation.
///
/// Provides the same at-least-once, consumer-group semantics as a real
/// broker: messages are kept in an append-only log per topic, each
/// consumer group tracks its own position, unacknowledged deliveries
/// are redelivered, and a message that exhausts its delivery attempts
/// is parked on a dead-letter queue.
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Creates a bus with the default delivery attempt limit.
    pub fn new() -> Self {
        Self::with_max_delivery_attempts(DEFAULT_MAX_DELIVERY_ATTEMPTS)
    }

    /// Creates a bus that dead-letters after `max_delivery_attempts`
    /// failed deliveries.
    pub fn with_max_delivery_attempts(max_delivery_attempts: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(BusState::default()),
                notify: Notify::new(),
                max_delivery_attempts,
            }),
        }
    }

    /// Returns all messages published to a topic, in publish order.
    pub async fn topic_messages(&self, topic: &str) -> Vec<MessageEnvelope> {
        let state = self.inner.state.read().await;
        state.topics.get(topic).cloned().unwrap_or_default()
    }

    /// Returns the number of messages published to a topic.
    pub async fn message_count(&self, topic: &str) -> usize {
        let state = self.inner.state.read().await;
        state.topics.get(topic).map_or(0, |log| log.len())
    }

    /// Returns the dead letters parked for a topic.
    pub async fn dead_letters(&self, topic: &str) -> Vec<DeadLetter> {
        let state = self.inner.state.read().await;
        state.dead_letters.get(topic).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<()> {
        let topic = envelope.topic.clone();
        {
            let mut state = self.inner.state.write().await;
            state.topics.entry(topic.clone()).or_default().push(envelope);
        }
        metrics::counter!("bus_messages_published").increment(1);
        tracing::debug!(%topic, "message published");
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, topic: &str, consumer_group: &str) -> Result<Box<dyn Subscription>> {
        let key = (topic.to_string(), consumer_group.to_string());
        {
            let mut state = self.inner.state.write().await;
            let group = state.groups.entry(key).or_default();

            // Deliveries left in flight by a previous subscriber go
            // back on the redelivery queue.
            let mut orphaned: Vec<usize> = group
                .pending
                .keys()
                .copied()
                .filter(|idx| !group.redeliver.contains(idx))
                .collect();
            orphaned.sort_unstable();
            group.redeliver.extend(orphaned);
        }

        Ok(Box::new(MemorySubscription {
            inner: self.inner.clone(),
            topic: topic.to_string(),
            group: consumer_group.to_string(),
        }))
    }
}

struct MemorySubscription {
    inner: Arc<Inner>,
    topic: String,
    group: String,
}

impl MemorySubscription {
    async fn pick_next(&self) -> Result<Option<Delivery>> {
        let mut state = self.inner.state.write().await;
        let log_len = state.topics.get(&self.topic).map_or(0, |log| log.len());

        let key = (self.topic.clone(), self.group.clone());
        let group = state
            .groups
            .get_mut(&key)
            .ok_or_else(|| MessagingError::SubscriptionClosed {
                topic: self.topic.clone(),
                group: self.group.clone(),
            })?;

        let picked = if let Some(index) = group.redeliver.pop_front() {
            let attempt = group.pending.get(&index).copied().unwrap_or(0) + 1;
            group.pending.insert(index, attempt);
            Some((index, attempt))
        } else if group.next_index < log_len {
            let index = group.next_index;
            group.next_index += 1;
            group.pending.insert(index, 1);
            Some((index, 1))
        } else {
            None
        };

        let Some((index, attempt)) = picked else {
            return Ok(None);
        };

        let envelope = state
            .topics
            .get(&self.topic)
            .and_then(|log| log.get(index))
            .cloned()
            .ok_or_else(|| {
                MessagingError::Unavailable(format!(
                    "message index {index} missing from topic '{}'",
                    self.topic
                ))
            })?;

        let handle = MemoryAckHandle {
            inner: self.inner.clone(),
            topic: self.topic.clone(),
            group: self.group.clone(),
            index,
        };

        Ok(Some(Delivery::new(envelope, attempt, Box::new(handle))))
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Delivery> {
        loop {
            let inner = self.inner.clone();
            let notified = inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.pick_next().await? {
                return Ok(delivery);
            }

            notified.await;
        }
    }

    async fn try_next(&mut self) -> Result<Option<Delivery>> {
        self.pick_next().await
    }
}

struct MemoryAckHandle {
    inner: Arc<Inner>,
    topic: String,
    group: String,
    index: usize,
}

#[async_trait]
impl AckHandle for MemoryAckHandle {
    async fn ack(self: Box<Self>) -> Result<()> {
        let mut state = self.inner.state.write().await;
        let key = (self.topic.clone(), self.group.clone());
        if let Some(group) = state.groups.get_mut(&key) {
            group.pending.remove(&self.index);
        }
        Ok(())
    }

    async fn nack(self: Box<Self>, reason: &str) -> Result<()> {
        let mut state = self.inner.state.write().await;

        let envelope = state
            .topics
            .get(&self.topic)
            .and_then(|log| log.get(self.index))
            .cloned();

        let key = (self.topic.clone(), self.group.clone());
        let max_attempts = self.inner.max_delivery_attempts;
        let Some(group) = state.groups.get_mut(&key) else {
            return Ok(());
        };

        let attempts = group.pending.get(&self.index).copied().unwrap_or(0);
        if attempts >= max_attempts {
            group.pending.remove(&self.index);
            if let Some(envelope) = envelope {
                tracing::warn!(
                    topic = %self.topic,
                    group = %self.group,
                    message_id = %envelope.message_id,
                    attempts,
                    reason,
                    "message dead-lettered"
                );
                metrics::counter!("bus_messages_dead_lettered").increment(1);
                state
                    .dead_letters
                    .entry(self.topic.clone())
                    .or_default()
                    .push(DeadLetter {
                        envelope,
                        consumer_group: self.group.clone(),
                        attempts,
                        last_error: reason.to_string(),
                        dead_lettered_at: Utc::now(),
                    });
            }
        } else {
            group.redeliver.push_back(self.index);
        }

        drop(state);
        self.inner.notify.notify_waiters();
        Ok(())
    }
}
