//! Runtime configuration loaded from environment variables.

use std::time::Duration;

/// Orchestrator configuration with sensible defaults.
///
/// Consumed by the `from_config` constructors on [`Orchestrator`],
/// [`Worker`], and [`OutboxDispatcher`].
///
/// Reads from environment variables:
/// - `CONSUMER_GROUP` — durable consumer group name (default: `"orchestrator"`)
/// - `MAX_CONFLICT_RETRIES` — save attempts per event (default: `3`)
/// - `HANDLE_TIMEOUT_MS` — per-event processing bound (default: `5000`)
/// - `OUTBOX_POLL_INTERVAL_MS` — outbox scan pause (default: `100`)
/// - `OUTBOX_BATCH_SIZE` — entries per outbox scan (default: `50`)
///
/// [`Orchestrator`]: crate::Orchestrator
/// [`Worker`]: crate::Worker
/// [`OutboxDispatcher`]: crate::OutboxDispatcher
#[derive(Debug, Clone)]
pub struct Config {
    pub consumer_group: String,
    pub max_conflict_retries: u32,
    pub handle_timeout: Duration,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            consumer_group: std::env::var("CONSUMER_GROUP")
                .unwrap_or_else(|_| "orchestrator".to_string()),
            max_conflict_retries: std::env::var("MAX_CONFLICT_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            handle_timeout: Duration::from_millis(
                std::env::var("HANDLE_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5000),
            ),
            outbox_poll_interval: Duration::from_millis(
                std::env::var("OUTBOX_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(100),
            ),
            outbox_batch_size: std::env::var("OUTBOX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            consumer_group: "orchestrator".to_string(),
            max_conflict_retries: 3,
            handle_timeout: Duration::from_millis(5000),
            outbox_poll_interval: Duration::from_millis(100),
            outbox_batch_size: 50,
        }
    }
}
