use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{IdempotencyKey, OrderId};

/// An outbound command as handed to the store, before a sequence
/// number is assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxCommand {
    /// Stable message identity, reused on every publish attempt so the
    /// broker and consumers can deduplicate.
    pub message_id: Uuid,

    /// Target topic.
    pub topic: String,

    /// Deduplication key for the command's logical operation.
    pub idempotency_key: IdempotencyKey,

    /// Serialized command payload.
    pub payload: serde_json::Value,
}

/// A persisted outbox entry.
///
/// Entries are created in the same atomic write as the aggregate
/// transition that produced them, and published in `sequence` order
/// per order. The ordering guarantee is per-order only; entries of
/// different orders may interleave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// The order whose transition produced this command.
    pub order_id: OrderId,

    /// Per-order monotonic counter, starting at 1.
    pub sequence: i64,

    /// The command to publish.
    pub command: OutboxCommand,

    /// Whether the broker has acknowledged the publish.
    pub published: bool,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}
