use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;

use common::IdempotencyKey;

use crate::error::{IdempotencyError, Result};
use crate::store::{CheckOutcome, IdempotencyConfig, IdempotencyStore};

#[derive(Debug, Clone)]
enum RecordState {
    InFlight { reserved_at: DateTime<Utc> },
    Completed { result: serde_json::Value },
}

#[derive(Debug, Clone)]
struct IdempotencyRecord {
    state: RecordState,
    expires_at: DateTime<Utc>,
}

/// In-memory idempotency store.
///
/// All transitions on a key happen under a single write lock, which
/// gives the atomic check-and-reserve the trait requires.
#[derive(Clone)]
pub struct InMemoryIdempotencyStore {
    records: Arc<RwLock<HashMap<IdempotencyKey, IdempotencyRecord>>>,
    config: IdempotencyConfig,
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new(IdempotencyConfig::default())
    }
}

impl InMemoryIdempotencyStore {
    /// Creates a store with the given timeout/retention settings.
    pub fn new(config: IdempotencyConfig) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Returns the number of live records (expired ones included until
    /// the next purge).
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Drops all records whose retention window has passed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.expires_at > now);
        before - records.len()
    }

    fn in_flight_deadline(&self, reserved_at: DateTime<Utc>) -> DateTime<Utc> {
        reserved_at
            + ChronoDuration::from_std(self.config.in_flight_timeout)
                .unwrap_or_else(|_| ChronoDuration::seconds(30))
    }

    fn retention_deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + ChronoDuration::from_std(self.config.result_ttl)
            .unwrap_or_else(|_| ChronoDuration::hours(24))
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn check_and_reserve(&self, key: &IdempotencyKey) -> Result<CheckOutcome> {
        let now = Utc::now();
        let mut records = self.records.write().await;

        match records.get(key) {
            Some(record) if record.expires_at <= now => {
                // Retention lapsed; treat as never seen.
            }
            Some(record) => match &record.state {
                RecordState::Completed { result } => {
                    metrics::counter!("idempotency_duplicates").increment(1);
                    return Ok(CheckOutcome::Duplicate(result.clone()));
                }
                RecordState::InFlight { reserved_at } => {
                    if self.in_flight_deadline(*reserved_at) > now {
                        return Ok(CheckOutcome::InFlight);
                    }
                    // Reservation abandoned (holder crashed between
                    // reserve and record); fall through and re-reserve.
                    tracing::warn!(%key, "re-reserving abandoned in-flight key");
                }
            },
            None => {}
        }

        records.insert(
            key.clone(),
            IdempotencyRecord {
                state: RecordState::InFlight { reserved_at: now },
                expires_at: self.retention_deadline(now),
            },
        );
        Ok(CheckOutcome::Fresh)
    }

    async fn record_result(&self, key: &IdempotencyKey, result: serde_json::Value) -> Result<()> {
        let now = Utc::now();
        let mut records = self.records.write().await;

        match records.get(key) {
            Some(record) if matches!(record.state, RecordState::InFlight { .. }) => {
                records.insert(
                    key.clone(),
                    IdempotencyRecord {
                        state: RecordState::Completed { result },
                        expires_at: self.retention_deadline(now),
                    },
                );
                Ok(())
            }
            _ => Err(IdempotencyError::NotReserved(key.clone())),
        }
    }

    async fn release(&self, key: &IdempotencyKey) -> Result<()> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get(key)
            && matches!(record.state, RecordState::InFlight { .. })
        {
            records.remove(key);
        }
        Ok(())
    }
}
