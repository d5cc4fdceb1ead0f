//! The saga orchestrator: one inbound event in, one transition out.

use std::sync::Arc;

use uuid::Uuid;

use domain::{EventOutcome, Order, OrderEvent, OrderState};
use idempotency::{CheckOutcome, IdempotencyStore};
use messaging::MessageEnvelope;
use store::{OrderRecord, OutboxCommand, StateStore, Version};

use crate::config::Config;
use crate::error::{OrchestratorError, Result};

/// Default number of save attempts before giving up on a contended
/// order.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// What processing one envelope amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// The event transitioned the order; its commands are in the
    /// outbox awaiting dispatch.
    Applied {
        state: OrderState,
        version: Version,
        commands: Vec<String>,
    },

    /// The idempotency key was already processed; the first
    /// processing's cached result is returned and nothing re-executes.
    Duplicate(serde_json::Value),

    /// Another worker holds the key's reservation. Retry shortly.
    InFlight,

    /// The event was not awaited in the order's current state.
    Discarded { reason: String },
}

impl HandleOutcome {
    /// Summary recorded in the idempotency store, returned verbatim to
    /// duplicate deliveries.
    fn summary(&self) -> serde_json::Value {
        match self {
            HandleOutcome::Applied {
                state,
                version,
                commands,
            } => serde_json::json!({
                "outcome": "applied",
                "state": state.as_str(),
                "version": version,
                "commands": commands,
            }),
            HandleOutcome::Discarded { reason } => serde_json::json!({
                "outcome": "discarded",
                "reason": reason,
            }),
            // Never recorded; duplicates and in-flight keys do not
            // complete a reservation.
            HandleOutcome::Duplicate(value) => value.clone(),
            HandleOutcome::InFlight => serde_json::Value::Null,
        }
    }
}

/// Drives orders through the checkout saga.
///
/// Each call to [`handle`](Orchestrator::handle) processes exactly one
/// envelope: deduplicate, load the aggregate, let it decide, persist
/// aggregate and outbox atomically. Optimistic conflicts with other
/// workers are resolved by reloading and re-deciding, bounded by
/// `max_conflict_retries`.
pub struct Orchestrator<S, I> {
    store: Arc<S>,
    idempotency: Arc<I>,
    max_conflict_retries: u32,
}

impl<S, I> Orchestrator<S, I>
where
    S: StateStore,
    I: IdempotencyStore,
{
    /// Creates a new orchestrator.
    pub fn new(store: Arc<S>, idempotency: Arc<I>) -> Self {
        Self {
            store,
            idempotency,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    /// Creates an orchestrator wired from [`Config`].
    pub fn from_config(store: Arc<S>, idempotency: Arc<I>, config: &Config) -> Self {
        Self::new(store, idempotency).with_max_conflict_retries(config.max_conflict_retries)
    }

    /// Overrides the conflict retry budget.
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Processes one inbound envelope.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            topic = %envelope.topic,
            order_id = %envelope.order_id,
            idempotency_key = %envelope.idempotency_key,
        )
    )]
    pub async fn handle(&self, envelope: &MessageEnvelope) -> Result<HandleOutcome> {
        metrics::counter!("orchestrator_events_total").increment(1);

        let key = &envelope.idempotency_key;
        match self.idempotency.check_and_reserve(key).await? {
            CheckOutcome::Duplicate(cached) => {
                metrics::counter!("orchestrator_duplicates_total").increment(1);
                tracing::debug!("duplicate delivery, returning cached result");
                return Ok(HandleOutcome::Duplicate(cached));
            }
            CheckOutcome::InFlight => {
                tracing::debug!("key reserved by another worker");
                return Ok(HandleOutcome::InFlight);
            }
            CheckOutcome::Fresh => {}
        }

        // The reservation is held from here; release it on failure so
        // a redelivery can retry without waiting out the timeout.
        match self.process(envelope).await {
            Ok(outcome) => {
                self.idempotency.record_result(key, outcome.summary()).await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(release_err) = self.idempotency.release(key).await {
                    tracing::warn!(error = %release_err, "failed to release idempotency key");
                }
                Err(err)
            }
        }
    }

    async fn process(&self, envelope: &MessageEnvelope) -> Result<HandleOutcome> {
        let event: OrderEvent = serde_json::from_value(envelope.payload.clone())?;
        let order_id = envelope.order_id;

        for attempt in 1..=self.max_conflict_retries {
            let (mut order, expected_version) = match self.store.load(order_id).await? {
                Some(record) => {
                    let order: Order = record.deserialize_state()?;
                    (order, record.version)
                }
                None => (Order::new(order_id), Version::initial()),
            };

            let outcome = order.handle(&event)?;
            let commands = match outcome {
                EventOutcome::Discarded { reason } => {
                    metrics::counter!("orchestrator_discarded_total").increment(1);
                    tracing::debug!(%reason, "event discarded");
                    return Ok(HandleOutcome::Discarded { reason });
                }
                EventOutcome::Applied { commands } => commands,
            };

            let command_types: Vec<String> = commands
                .iter()
                .map(|c| c.command_type().to_string())
                .collect();
            let outbox: Vec<OutboxCommand> = commands
                .iter()
                .map(|command| {
                    Ok(OutboxCommand {
                        message_id: Uuid::new_v4(),
                        topic: command.topic().to_string(),
                        idempotency_key: command.idempotency_key(),
                        payload: serde_json::to_value(command)?,
                    })
                })
                .collect::<Result<_>>()?;

            let record = OrderRecord::from_state(order_id, &order)?;
            match self.store.save(record, expected_version, outbox).await {
                Ok(version) => {
                    metrics::counter!("orchestrator_transitions_total").increment(1);
                    tracing::info!(
                        state = %order.state,
                        %version,
                        event = event.event_type(),
                        "order transitioned"
                    );
                    return Ok(HandleOutcome::Applied {
                        state: order.state,
                        version,
                        commands: command_types,
                    });
                }
                Err(store::StoreError::Conflict { actual, .. }) => {
                    metrics::counter!("orchestrator_conflicts_total").increment(1);
                    tracing::debug!(attempt, %actual, "save conflict, reloading");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(OrchestratorError::ConflictRetriesExhausted {
            order_id,
            attempts: self.max_conflict_retries,
        })
    }
}
