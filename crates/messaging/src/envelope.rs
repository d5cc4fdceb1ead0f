use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{IdempotencyKey, OrderId};

/// Unique identifier for a message on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a message ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An envelope wrapping a command or event payload with the metadata
/// every message on the bus carries.
///
/// The `order_id` correlates the message to one checkout; the
/// `idempotency_key` lets consumers treat redelivery as a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Unique identifier for this message.
    pub message_id: MessageId,

    /// Topic the message is published to (e.g. "payment.charge").
    pub topic: String,

    /// The order this message belongs to.
    pub order_id: OrderId,

    /// Deduplication key for the logical operation this message carries.
    pub idempotency_key: IdempotencyKey,

    /// When the message was created.
    pub timestamp: DateTime<Utc>,

    /// The command or event payload as JSON.
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    /// Creates a new message envelope builder.
    pub fn builder() -> MessageEnvelopeBuilder {
        MessageEnvelopeBuilder::default()
    }
}

/// Builder for constructing message envelopes.
#[derive(Debug, Default)]
pub struct MessageEnvelopeBuilder {
    message_id: Option<MessageId>,
    topic: Option<String>,
    order_id: Option<OrderId>,
    idempotency_key: Option<IdempotencyKey>,
    timestamp: Option<DateTime<Utc>>,
    payload: Option<serde_json::Value>,
}

impl MessageEnvelopeBuilder {
    /// Sets the message ID. If not set, a new ID will be generated.
    pub fn message_id(mut self, id: MessageId) -> Self {
        self.message_id = Some(id);
        self
    }

    /// Sets the topic.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets the correlating order ID.
    pub fn order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// Sets the idempotency key.
    pub fn idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builds the message envelope.
    ///
    /// # Panics
    ///
    /// Panics if required fields (topic, order_id, idempotency_key, payload)
    /// are not set.
    pub fn build(self) -> MessageEnvelope {
        MessageEnvelope {
            message_id: self.message_id.unwrap_or_default(),
            topic: self.topic.expect("topic is required"),
            order_id: self.order_id.expect("order_id is required"),
            idempotency_key: self.idempotency_key.expect("idempotency_key is required"),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            payload: self.payload.expect("payload is required"),
        }
    }

    /// Tries to build the envelope, returning None if required fields are missing.
    pub fn try_build(self) -> Option<MessageEnvelope> {
        Some(MessageEnvelope {
            message_id: self.message_id.unwrap_or_default(),
            topic: self.topic?,
            order_id: self.order_id?,
            idempotency_key: self.idempotency_key?,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            payload: self.payload?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_new_creates_unique_ids() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn envelope_builder() {
        let order_id = OrderId::new();
        let payload = serde_json::json!({"amount": 1000});

        let envelope = MessageEnvelope::builder()
            .topic("payment.charge")
            .order_id(order_id)
            .idempotency_key("charge:abc".into())
            .payload_raw(payload.clone())
            .build();

        assert_eq!(envelope.topic, "payment.charge");
        assert_eq!(envelope.order_id, order_id);
        assert_eq!(envelope.idempotency_key.as_str(), "charge:abc");
        assert_eq!(envelope.payload, payload);
    }

    #[test]
    fn envelope_try_build_returns_none_on_missing_fields() {
        let result = MessageEnvelope::builder().try_build();
        assert!(result.is_none());
    }

    #[test]
    fn envelope_serialization_roundtrip() {
        let envelope = MessageEnvelope::builder()
            .topic("inventory.reserve")
            .order_id(OrderId::new())
            .idempotency_key(IdempotencyKey::random())
            .payload_raw(serde_json::json!({"items": []}))
            .build();

        let json = serde_json::to_string(&envelope).unwrap();
        let deserialized: MessageEnvelope = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.message_id, envelope.message_id);
        assert_eq!(deserialized.topic, envelope.topic);
        assert_eq!(deserialized.order_id, envelope.order_id);
    }
}
