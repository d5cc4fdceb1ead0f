//! The order aggregate: the saga's durable state machine.

use std::collections::BTreeSet;

use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::commands::{
    ChargePaymentData, NotifyFailureData, OrderCommand, RefundPaymentData, ReleaseReservationData,
    ReserveInventoryData, SendConfirmationData,
};
use crate::error::{OrderError, Result};
use crate::events::OrderEvent;
use crate::state::OrderState;
use crate::value_objects::{LineItem, Money, PaymentAttemptId, ReservationId};

/// Compensation step names recorded in `compensations_applied`.
const COMP_PAYMENT: &str = "payment";
const COMP_RESERVATION: &str = "reservation";

/// Outcome of feeding one event to the aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The event moved the state machine; the commands must be written
    /// to the outbox in the same durable unit as the aggregate.
    Applied { commands: Vec<OrderCommand> },

    /// The event was not awaited in the current state. Expected under
    /// at-least-once delivery; acknowledge and move on.
    Discarded { reason: String },
}

impl EventOutcome {
    fn applied(commands: Vec<OrderCommand>) -> Self {
        EventOutcome::Applied { commands }
    }

    fn discarded(reason: impl Into<String>) -> Self {
        EventOutcome::Discarded {
            reason: reason.into(),
        }
    }

    /// Returns true if the event was discarded.
    pub fn is_discarded(&self) -> bool {
        matches!(self, EventOutcome::Discarded { .. })
    }
}

/// One checkout's progress through payment, reservation, and
/// notification.
///
/// The aggregate is pure state: `handle` consumes a provider event,
/// mutates `self`, and returns the commands to emit. It never touches
/// the store or the bus. A business decline (payment refused, stock
/// unavailable) is a transition, not an error; `Err` is reserved for
/// invariant violations that must leave the aggregate untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier, doubles as the correlation ID.
    pub order_id: OrderId,

    /// Current position in the saga.
    pub state: OrderState,

    /// Cart contents, immutable after checkout is requested.
    pub line_items: Vec<LineItem>,

    /// Set once the payment provider confirms a charge.
    pub payment_attempt_id: Option<PaymentAttemptId>,

    /// Set once the inventory provider confirms a hold.
    pub reservation_id: Option<ReservationId>,

    /// Steps already rolled back. Guards against double-compensation
    /// when failure events are redelivered.
    pub compensations_applied: BTreeSet<String>,

    /// Diagnostic for the terminal failed state.
    pub last_error: Option<String>,
}

impl Order {
    /// Creates a fresh aggregate for an order that has not checked out
    /// yet.
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            state: OrderState::Created,
            line_items: Vec::new(),
            payment_attempt_id: None,
            reservation_id: None,
            compensations_applied: BTreeSet::new(),
            last_error: None,
        }
    }

    /// Returns the order total across all line items, or `None` if it
    /// overflows.
    pub fn total(&self) -> Option<Money> {
        self.line_items
            .iter()
            .try_fold(Money::zero(), |acc, item| acc.checked_add(item.total()?))
    }

    /// Returns true if the named compensation step already ran.
    pub fn compensated(&self, step: &str) -> bool {
        self.compensations_applied.contains(step)
    }

    /// Feeds one provider event to the state machine.
    ///
    /// On `Applied`, `self` holds the new state and the returned
    /// commands must be persisted with it atomically. On `Discarded`,
    /// `self` is unchanged. On `Err`, `self` is unchanged and the
    /// caller must not acknowledge the event as processed.
    pub fn handle(&mut self, event: &OrderEvent) -> Result<EventOutcome> {
        if event.order_id() != self.order_id {
            return Err(OrderError::CorrelationMismatch {
                expected: self.order_id,
                got: event.order_id(),
            });
        }

        if self.state.is_terminal() {
            return Ok(EventOutcome::discarded(format!(
                "order already {}, {} ignored",
                self.state,
                event.event_type()
            )));
        }

        match (self.state, event) {
            (OrderState::Created, OrderEvent::CheckoutRequested(data)) => {
                let amount = self.validate_line_items(&data.line_items)?;
                self.line_items = data.line_items.clone();
                self.state = OrderState::PaymentPending;
                Ok(EventOutcome::applied(vec![OrderCommand::ChargePayment(
                    ChargePaymentData {
                        order_id: self.order_id,
                        amount,
                    },
                )]))
            }

            (OrderState::PaymentPending, OrderEvent::PaymentConfirmed(data)) => {
                self.payment_attempt_id = Some(data.payment_attempt_id.clone());
                self.state = OrderState::ReservationPending;
                Ok(EventOutcome::applied(vec![OrderCommand::ReserveInventory(
                    ReserveInventoryData {
                        order_id: self.order_id,
                        line_items: self.line_items.clone(),
                    },
                )]))
            }

            (OrderState::PaymentPending, OrderEvent::PaymentDeclined(data)) => {
                self.state = OrderState::Failed;
                self.last_error = Some(data.reason.clone());
                Ok(EventOutcome::applied(vec![OrderCommand::NotifyFailure(
                    NotifyFailureData {
                        order_id: self.order_id,
                        reason: data.reason.clone(),
                    },
                )]))
            }

            (OrderState::ReservationPending, OrderEvent::InventoryReserved(data)) => {
                self.reservation_id = Some(data.reservation_id.clone());
                self.state = OrderState::Completed;
                Ok(EventOutcome::applied(vec![OrderCommand::SendConfirmation(
                    SendConfirmationData {
                        order_id: self.order_id,
                    },
                )]))
            }

            (OrderState::ReservationPending, OrderEvent::InventoryUnavailable(data)) => {
                if self.compensated(COMP_PAYMENT) {
                    return Ok(EventOutcome::discarded("refund already issued"));
                }
                let payment_attempt_id = self
                    .payment_attempt_id
                    .clone()
                    .ok_or(OrderError::MissingPaymentAttempt(self.order_id))?;

                self.state = OrderState::CompensatingPayment;
                self.last_error = Some(data.reason.clone());
                self.compensations_applied.insert(COMP_PAYMENT.to_string());
                Ok(EventOutcome::applied(vec![OrderCommand::RefundPayment(
                    RefundPaymentData {
                        order_id: self.order_id,
                        payment_attempt_id,
                    },
                )]))
            }

            // The hold landed after the order was already being rolled
            // back; release it rather than strand the stock.
            (OrderState::CompensatingPayment, OrderEvent::InventoryReserved(data)) => {
                if self.compensated(COMP_RESERVATION) {
                    return Ok(EventOutcome::discarded("reservation already released"));
                }
                self.reservation_id = Some(data.reservation_id.clone());
                self.compensations_applied
                    .insert(COMP_RESERVATION.to_string());
                Ok(EventOutcome::applied(vec![
                    OrderCommand::ReleaseReservation(ReleaseReservationData {
                        order_id: self.order_id,
                        reservation_id: data.reservation_id.clone(),
                    }),
                ]))
            }

            (OrderState::CompensatingPayment, OrderEvent::RefundConfirmed(_)) => {
                self.state = OrderState::Failed;
                let reason = self
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "reservation failed".to_string());
                Ok(EventOutcome::applied(vec![OrderCommand::NotifyFailure(
                    NotifyFailureData {
                        order_id: self.order_id,
                        reason,
                    },
                )]))
            }

            (state, event) => Ok(EventOutcome::discarded(format!(
                "{} not awaited in state {}",
                event.event_type(),
                state
            ))),
        }
    }

    /// Validates the checkout's line items and returns the chargeable
    /// total. Quantities and prices arrive off the wire, so magnitude
    /// is checked along with positivity.
    fn validate_line_items(&self, line_items: &[LineItem]) -> Result<Money> {
        if line_items.is_empty() {
            return Err(OrderError::EmptyOrder(self.order_id));
        }
        let mut total = Money::zero();
        for item in line_items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    order_id: self.order_id,
                    sku: item.sku.to_string(),
                });
            }
            if !item.unit_price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    order_id: self.order_id,
                    sku: item.sku.to_string(),
                });
            }
            total = item
                .total()
                .and_then(|line_total| total.checked_add(line_total))
                .ok_or(OrderError::TotalOverflow(self.order_id))?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        CheckoutRequestedData, InventoryReservedData, InventoryUnavailableData,
        PaymentConfirmedData, PaymentDeclinedData, RefundConfirmedData,
    };

    fn checkout(order_id: OrderId) -> OrderEvent {
        OrderEvent::CheckoutRequested(CheckoutRequestedData {
            order_id,
            line_items: vec![LineItem::new("SKU-X", 1, Money::from_dollars(10))],
        })
    }

    fn payment_confirmed(order_id: OrderId) -> OrderEvent {
        OrderEvent::PaymentConfirmed(PaymentConfirmedData {
            order_id,
            payment_attempt_id: PaymentAttemptId::new("pay-1"),
        })
    }

    fn inventory_reserved(order_id: OrderId) -> OrderEvent {
        OrderEvent::InventoryReserved(InventoryReservedData {
            order_id,
            reservation_id: ReservationId::new("res-1"),
        })
    }

    fn inventory_unavailable(order_id: OrderId) -> OrderEvent {
        OrderEvent::InventoryUnavailable(InventoryUnavailableData {
            order_id,
            reason: "out_of_stock".to_string(),
        })
    }

    fn applied_commands(outcome: EventOutcome) -> Vec<OrderCommand> {
        match outcome {
            EventOutcome::Applied { commands } => commands,
            EventOutcome::Discarded { reason } => panic!("unexpected discard: {reason}"),
        }
    }

    #[test]
    fn happy_path_reaches_completed() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);

        let commands = applied_commands(order.handle(&checkout(order_id)).unwrap());
        assert_eq!(order.state, OrderState::PaymentPending);
        assert!(matches!(commands[0], OrderCommand::ChargePayment(ref data)
            if data.amount == Money::from_dollars(10)));

        let commands = applied_commands(order.handle(&payment_confirmed(order_id)).unwrap());
        assert_eq!(order.state, OrderState::ReservationPending);
        assert!(matches!(commands[0], OrderCommand::ReserveInventory(_)));

        let commands = applied_commands(order.handle(&inventory_reserved(order_id)).unwrap());
        assert_eq!(order.state, OrderState::Completed);
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0], OrderCommand::SendConfirmation(_)));
        assert_eq!(order.reservation_id, Some(ReservationId::new("res-1")));
    }

    #[test]
    fn payment_declined_fails_without_reservation() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);
        order.handle(&checkout(order_id)).unwrap();

        let declined = OrderEvent::PaymentDeclined(PaymentDeclinedData {
            order_id,
            reason: "insufficient_funds".to_string(),
        });
        let commands = applied_commands(order.handle(&declined).unwrap());

        assert_eq!(order.state, OrderState::Failed);
        assert_eq!(order.last_error.as_deref(), Some("insufficient_funds"));
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0], OrderCommand::NotifyFailure(ref data)
            if data.reason == "insufficient_funds"));
        assert!(order.reservation_id.is_none());
    }

    #[test]
    fn inventory_unavailable_triggers_refund_then_failed() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);
        order.handle(&checkout(order_id)).unwrap();
        order.handle(&payment_confirmed(order_id)).unwrap();

        let commands = applied_commands(order.handle(&inventory_unavailable(order_id)).unwrap());
        assert_eq!(order.state, OrderState::CompensatingPayment);
        assert!(matches!(commands[0], OrderCommand::RefundPayment(ref data)
            if data.payment_attempt_id == PaymentAttemptId::new("pay-1")));
        assert!(order.compensated("payment"));

        let refund = OrderEvent::RefundConfirmed(RefundConfirmedData { order_id });
        let commands = applied_commands(order.handle(&refund).unwrap());
        assert_eq!(order.state, OrderState::Failed);
        assert!(matches!(commands[0], OrderCommand::NotifyFailure(ref data)
            if data.reason == "out_of_stock"));
    }

    #[test]
    fn duplicate_payment_confirmed_is_discarded() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);
        order.handle(&checkout(order_id)).unwrap();
        order.handle(&payment_confirmed(order_id)).unwrap();
        order.handle(&inventory_reserved(order_id)).unwrap();
        assert_eq!(order.state, OrderState::Completed);

        let before = order.clone();
        let outcome = order.handle(&payment_confirmed(order_id)).unwrap();

        assert!(outcome.is_discarded());
        assert_eq!(order.state, before.state);
        assert_eq!(order.payment_attempt_id, before.payment_attempt_id);
    }

    #[test]
    fn stale_event_in_nonterminal_state_is_discarded() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);
        order.handle(&checkout(order_id)).unwrap();

        // InventoryReserved before the payment verdict is not awaited.
        let outcome = order.handle(&inventory_reserved(order_id)).unwrap();
        assert!(outcome.is_discarded());
        assert_eq!(order.state, OrderState::PaymentPending);
    }

    #[test]
    fn late_reservation_during_compensation_is_released() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);
        order.handle(&checkout(order_id)).unwrap();
        order.handle(&payment_confirmed(order_id)).unwrap();
        order.handle(&inventory_unavailable(order_id)).unwrap();
        assert_eq!(order.state, OrderState::CompensatingPayment);

        let commands = applied_commands(order.handle(&inventory_reserved(order_id)).unwrap());
        assert!(matches!(commands[0], OrderCommand::ReleaseReservation(ref data)
            if data.reservation_id == ReservationId::new("res-1")));
        assert!(order.compensated("reservation"));

        // Redelivery of the same hold must not release twice.
        let outcome = order.handle(&inventory_reserved(order_id)).unwrap();
        assert!(outcome.is_discarded());
    }

    #[test]
    fn empty_checkout_is_rejected() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);

        let event = OrderEvent::CheckoutRequested(CheckoutRequestedData {
            order_id,
            line_items: vec![],
        });
        let result = order.handle(&event);

        assert!(matches!(result, Err(OrderError::EmptyOrder(_))));
        assert_eq!(order.state, OrderState::Created);
    }

    #[test]
    fn zero_quantity_line_is_rejected() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);

        let event = OrderEvent::CheckoutRequested(CheckoutRequestedData {
            order_id,
            line_items: vec![LineItem::new("SKU-X", 0, Money::from_dollars(10))],
        });

        assert!(matches!(
            order.handle(&event),
            Err(OrderError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn mismatched_order_id_is_an_error() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);

        let result = order.handle(&checkout(OrderId::new()));
        assert!(matches!(
            result,
            Err(OrderError::CorrelationMismatch { .. })
        ));
    }

    #[test]
    fn refund_without_payment_attempt_is_an_error() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);
        order.handle(&checkout(order_id)).unwrap();
        order.handle(&payment_confirmed(order_id)).unwrap();
        // Simulate a corrupted record.
        order.payment_attempt_id = None;

        let result = order.handle(&inventory_unavailable(order_id));
        assert!(matches!(
            result,
            Err(OrderError::MissingPaymentAttempt(_))
        ));
        assert_eq!(order.state, OrderState::ReservationPending);
    }

    #[test]
    fn total_sums_line_items() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);
        let event = OrderEvent::CheckoutRequested(CheckoutRequestedData {
            order_id,
            line_items: vec![
                LineItem::new("SKU-A", 2, Money::from_dollars(10)),
                LineItem::new("SKU-B", 1, Money::from_cents(550)),
            ],
        });
        order.handle(&event).unwrap();

        assert_eq!(order.total(), Some(Money::from_cents(2550)));
    }

    #[test]
    fn overflowing_checkout_total_is_rejected() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);

        let event = OrderEvent::CheckoutRequested(CheckoutRequestedData {
            order_id,
            line_items: vec![LineItem::new(
                "SKU-BIG",
                u32::MAX,
                Money::from_cents(i64::MAX / 2),
            )],
        });
        let result = order.handle(&event);

        assert!(matches!(result, Err(OrderError::TotalOverflow(_))));
        assert_eq!(order.state, OrderState::Created);
        assert!(order.line_items.is_empty());
    }

    #[test]
    fn checkout_outcome_compares_by_value() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);

        let outcome = order.handle(&checkout(order_id)).unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Applied {
                commands: vec![OrderCommand::ChargePayment(ChargePaymentData {
                    order_id,
                    amount: Money::from_dollars(10),
                })],
            }
        );
    }

    #[test]
    fn aggregate_serialization_roundtrip() {
        let order_id = OrderId::new();
        let mut order = Order::new(order_id);
        order.handle(&checkout(order_id)).unwrap();
        order.handle(&payment_confirmed(order_id)).unwrap();

        let json = serde_json::to_value(&order).unwrap();
        let back: Order = serde_json::from_value(json).unwrap();

        assert_eq!(back.order_id, order.order_id);
        assert_eq!(back.state, OrderState::ReservationPending);
        assert_eq!(back.payment_attempt_id, order.payment_attempt_id);
        assert_eq!(back.line_items, order.line_items);
    }
}
