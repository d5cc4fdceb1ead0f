//! Commands emitted by the checkout saga toward external providers.

use common::{IdempotencyKey, OrderId};
use serde::{Deserialize, Serialize};

use crate::topics;
use crate::value_objects::{LineItem, Money, PaymentAttemptId, ReservationId};

/// Commands the orchestrator issues through the outbox.
///
/// Every command carries a deterministic idempotency key derived from
/// the order, so a provider that sees the same command twice (outbox
/// redelivery, broker retry) can treat the repeat as a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderCommand {
    /// Capture payment for the order total.
    ChargePayment(ChargePaymentData),

    /// Place a hold on the order's stock.
    ReserveInventory(ReserveInventoryData),

    /// Reverse a captured charge.
    RefundPayment(RefundPaymentData),

    /// Release a previously placed stock hold.
    ReleaseReservation(ReleaseReservationData),

    /// Tell the customer the order went through.
    SendConfirmation(SendConfirmationData),

    /// Tell the customer the order failed, and why.
    NotifyFailure(NotifyFailureData),
}

impl OrderCommand {
    /// Returns the command type name.
    pub fn command_type(&self) -> &'static str {
        match self {
            OrderCommand::ChargePayment(_) => "ChargePayment",
            OrderCommand::ReserveInventory(_) => "ReserveInventory",
            OrderCommand::RefundPayment(_) => "RefundPayment",
            OrderCommand::ReleaseReservation(_) => "ReleaseReservation",
            OrderCommand::SendConfirmation(_) => "SendConfirmation",
            OrderCommand::NotifyFailure(_) => "NotifyFailure",
        }
    }

    /// Returns the bus topic this command is published to.
    pub fn topic(&self) -> &'static str {
        match self {
            OrderCommand::ChargePayment(_) => topics::CHARGE_PAYMENT,
            OrderCommand::ReserveInventory(_) => topics::RESERVE_INVENTORY,
            OrderCommand::RefundPayment(_) => topics::REFUND_PAYMENT,
            OrderCommand::ReleaseReservation(_) => topics::RELEASE_RESERVATION,
            OrderCommand::SendConfirmation(_) => topics::SEND_CONFIRMATION,
            OrderCommand::NotifyFailure(_) => topics::NOTIFY_FAILURE,
        }
    }

    /// Returns the order this command acts on.
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderCommand::ChargePayment(data) => data.order_id,
            OrderCommand::ReserveInventory(data) => data.order_id,
            OrderCommand::RefundPayment(data) => data.order_id,
            OrderCommand::ReleaseReservation(data) => data.order_id,
            OrderCommand::SendConfirmation(data) => data.order_id,
            OrderCommand::NotifyFailure(data) => data.order_id,
        }
    }

    /// Returns the command's deduplication key.
    pub fn idempotency_key(&self) -> IdempotencyKey {
        let prefix = match self {
            OrderCommand::ChargePayment(_) => "charge",
            OrderCommand::ReserveInventory(_) => "reserve",
            OrderCommand::RefundPayment(_) => "refund",
            OrderCommand::ReleaseReservation(_) => "release",
            OrderCommand::SendConfirmation(_) => "confirm",
            OrderCommand::NotifyFailure(_) => "notify-failure",
        };
        IdempotencyKey::new(format!("{prefix}:{}", self.order_id()))
    }
}

/// Data for ChargePayment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargePaymentData {
    /// The order being paid for.
    pub order_id: OrderId,

    /// Total amount to capture.
    pub amount: Money,
}

/// Data for ReserveInventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveInventoryData {
    /// The order to reserve stock for.
    pub order_id: OrderId,

    /// All lines of the order; reservation is all-or-nothing.
    pub line_items: Vec<LineItem>,
}

/// Data for RefundPayment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundPaymentData {
    /// The order whose charge is reversed.
    pub order_id: OrderId,

    /// The attempt to refund, as confirmed by the provider.
    pub payment_attempt_id: PaymentAttemptId,
}

/// Data for ReleaseReservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseReservationData {
    /// The order whose hold is released.
    pub order_id: OrderId,

    /// The hold to release, as assigned by the provider.
    pub reservation_id: ReservationId,
}

/// Data for SendConfirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendConfirmationData {
    /// The completed order.
    pub order_id: OrderId,
}

/// Data for NotifyFailure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyFailureData {
    /// The failed order.
    pub order_id: OrderId,

    /// Why the order failed.
    pub reason: String,
}
