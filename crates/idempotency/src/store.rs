use std::time::Duration;

use async_trait::async_trait;

use common::IdempotencyKey;

use crate::error::Result;

/// Outcome of an atomic check-and-reserve on a key.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// The key has never been processed; the caller now holds the
    /// reservation and must finish with `record_result` or `release`.
    Fresh,

    /// The key was already processed; the cached result of the first
    /// processing is returned and no side effect may be re-executed.
    Duplicate(serde_json::Value),

    /// Another caller holds an unexpired reservation for the key.
    /// Retry later; if the holder crashed, the reservation expires
    /// after the configured in-flight timeout.
    InFlight,
}

/// Retention and timeout settings for idempotency records.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// How long a reservation may stay in flight before it is
    /// considered abandoned and can be re-reserved.
    pub in_flight_timeout: Duration,

    /// How long a completed result is retained for deduplication.
    pub result_ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            in_flight_timeout: Duration::from_secs(30),
            result_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Contract for idempotency stores.
///
/// `check_and_reserve` must be atomic (compare-and-swap semantics on
/// the key) so that two racing deliveries can never both observe a key
/// as fresh.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically checks a key and reserves it if fresh.
    async fn check_and_reserve(&self, key: &IdempotencyKey) -> Result<CheckOutcome>;

    /// Records the result of processing a freshly reserved key. Every
    /// later `check_and_reserve` within the retention window returns
    /// this result as a duplicate.
    async fn record_result(&self, key: &IdempotencyKey, result: serde_json::Value) -> Result<()>;

    /// Releases a reservation without recording a result, so the key
    /// can be retried immediately. Used when processing failed after
    /// the reserve.
    async fn release(&self, key: &IdempotencyKey) -> Result<()>;
}
