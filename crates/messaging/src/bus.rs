use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::MessageEnvelope;
use crate::error::Result;

/// Handle used to acknowledge or reject one delivered message.
///
/// Exactly one of `ack` or `nack` must be called per delivery. A
/// delivery that is neither acked nor nacked (e.g. the consumer
/// crashed) is redelivered when the consumer group resubscribes.
#[async_trait]
pub trait AckHandle: Send {
    /// Confirms successful processing. The message will not be
    /// redelivered to this consumer group.
    async fn ack(self: Box<Self>) -> Result<()>;

    /// Rejects the message for redelivery. After the configured number
    /// of delivery attempts the message is moved to the dead-letter
    /// destination instead.
    async fn nack(self: Box<Self>, reason: &str) -> Result<()>;
}

/// A message delivered to a consumer, paired with its ack handle.
pub struct Delivery {
    /// The delivered envelope.
    pub envelope: MessageEnvelope,

    /// How many times this message has been delivered to the group,
    /// this delivery included.
    pub attempt: u32,

    handle: Box<dyn AckHandle>,
}

impl Delivery {
    /// Creates a delivery from an envelope and ack handle.
    pub fn new(envelope: MessageEnvelope, attempt: u32, handle: Box<dyn AckHandle>) -> Self {
        Self {
            envelope,
            attempt,
            handle,
        }
    }

    /// Acknowledges the message.
    pub async fn ack(self) -> Result<()> {
        self.handle.ack().await
    }

    /// Rejects the message with a diagnostic reason.
    pub async fn nack(self, reason: &str) -> Result<()> {
        self.handle.nack(reason).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message_id", &self.envelope.message_id)
            .field("topic", &self.envelope.topic)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// A lazy sequence of deliveries for one (topic, consumer group) pair.
///
/// The sequence is restartable: a new subscription for the same group
/// resumes from the last acknowledged position, and any deliveries
/// that were in flight when the previous subscriber went away are
/// redelivered first.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next delivery.
    async fn next(&mut self) -> Result<Delivery>;

    /// Returns the next delivery if one is immediately available.
    async fn try_next(&mut self) -> Result<Option<Delivery>>;
}

/// The event bus contract: at-least-once publish/subscribe with
/// durable consumer groups and explicit acknowledgment.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes an envelope to its topic. Returns once the broker has
    /// durably accepted the message.
    async fn publish(&self, envelope: MessageEnvelope) -> Result<()>;

    /// Opens a subscription for a consumer group on a topic.
    async fn subscribe(&self, topic: &str, consumer_group: &str) -> Result<Box<dyn Subscription>>;
}

/// A message that exhausted its delivery attempts, parked for operator
/// inspection instead of being dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    /// The original envelope.
    pub envelope: MessageEnvelope,

    /// The consumer group that failed to process it.
    pub consumer_group: String,

    /// Total delivery attempts before parking.
    pub attempts: u32,

    /// Reason given on the final nack.
    pub last_error: String,

    /// When the message was dead-lettered.
    pub dead_lettered_at: DateTime<Utc>,
}
