//! Provider events consumed by the checkout saga.

use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::topics;
use crate::value_objects::{LineItem, PaymentAttemptId, ReservationId};

/// Events that drive the order state machine.
///
/// Each arrives on its own bus topic; the envelope's payload
/// deserializes into the matching variant's data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// A customer finalized their cart.
    CheckoutRequested(CheckoutRequestedData),

    /// The payment provider captured the charge.
    PaymentConfirmed(PaymentConfirmedData),

    /// The payment provider declined the charge.
    PaymentDeclined(PaymentDeclinedData),

    /// The inventory provider placed a hold on the stock.
    InventoryReserved(InventoryReservedData),

    /// The inventory provider could not fulfill the reservation.
    InventoryUnavailable(InventoryUnavailableData),

    /// The payment provider confirmed the compensating refund.
    RefundConfirmed(RefundConfirmedData),
}

impl OrderEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::CheckoutRequested(_) => "CheckoutRequested",
            OrderEvent::PaymentConfirmed(_) => "PaymentConfirmed",
            OrderEvent::PaymentDeclined(_) => "PaymentDeclined",
            OrderEvent::InventoryReserved(_) => "InventoryReserved",
            OrderEvent::InventoryUnavailable(_) => "InventoryUnavailable",
            OrderEvent::RefundConfirmed(_) => "RefundConfirmed",
        }
    }

    /// Returns the bus topic this event arrives on.
    pub fn topic(&self) -> &'static str {
        match self {
            OrderEvent::CheckoutRequested(_) => topics::CHECKOUT_REQUESTED,
            OrderEvent::PaymentConfirmed(_) => topics::PAYMENT_CONFIRMED,
            OrderEvent::PaymentDeclined(_) => topics::PAYMENT_DECLINED,
            OrderEvent::InventoryReserved(_) => topics::INVENTORY_RESERVED,
            OrderEvent::InventoryUnavailable(_) => topics::INVENTORY_UNAVAILABLE,
            OrderEvent::RefundConfirmed(_) => topics::REFUND_CONFIRMED,
        }
    }

    /// Returns the order this event correlates to.
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::CheckoutRequested(data) => data.order_id,
            OrderEvent::PaymentConfirmed(data) => data.order_id,
            OrderEvent::PaymentDeclined(data) => data.order_id,
            OrderEvent::InventoryReserved(data) => data.order_id,
            OrderEvent::InventoryUnavailable(data) => data.order_id,
            OrderEvent::RefundConfirmed(data) => data.order_id,
        }
    }
}

/// Data for CheckoutRequested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequestedData {
    /// The order being checked out.
    pub order_id: OrderId,

    /// The finalized cart contents.
    pub line_items: Vec<LineItem>,
}

/// Data for PaymentConfirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmedData {
    /// The order the charge belongs to.
    pub order_id: OrderId,

    /// Provider-assigned attempt identifier, unique per attempt.
    pub payment_attempt_id: PaymentAttemptId,
}

/// Data for PaymentDeclined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDeclinedData {
    /// The order the charge belongs to.
    pub order_id: OrderId,

    /// Provider-reported decline reason (e.g. "insufficient_funds").
    pub reason: String,
}

/// Data for InventoryReserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReservedData {
    /// The order the hold belongs to.
    pub order_id: OrderId,

    /// Provider-assigned hold identifier.
    pub reservation_id: ReservationId,
}

/// Data for InventoryUnavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryUnavailableData {
    /// The order the reservation was for.
    pub order_id: OrderId,

    /// Provider-reported reason (e.g. "out_of_stock").
    pub reason: String,
}

/// Data for RefundConfirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundConfirmedData {
    /// The order whose charge was refunded.
    pub order_id: OrderId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::Money;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = OrderEvent::PaymentDeclined(PaymentDeclinedData {
            order_id: OrderId::new(),
            reason: "insufficient_funds".to_string(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PaymentDeclined");
        assert_eq!(json["data"]["reason"], "insufficient_funds");
    }

    #[test]
    fn checkout_requested_roundtrip() {
        let event = OrderEvent::CheckoutRequested(CheckoutRequestedData {
            order_id: OrderId::new(),
            line_items: vec![LineItem::new("SKU-1", 2, Money::from_dollars(10))],
        });

        let json = serde_json::to_value(&event).unwrap();
        let back: OrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "CheckoutRequested");
        assert_eq!(back.order_id(), event.order_id());
    }

    #[test]
    fn every_event_maps_to_an_inbound_topic() {
        let order_id = OrderId::new();
        let events = [
            OrderEvent::CheckoutRequested(CheckoutRequestedData {
                order_id,
                line_items: vec![],
            }),
            OrderEvent::PaymentConfirmed(PaymentConfirmedData {
                order_id,
                payment_attempt_id: PaymentAttemptId::new("pay-1"),
            }),
            OrderEvent::PaymentDeclined(PaymentDeclinedData {
                order_id,
                reason: "declined".to_string(),
            }),
            OrderEvent::InventoryReserved(InventoryReservedData {
                order_id,
                reservation_id: ReservationId::new("res-1"),
            }),
            OrderEvent::InventoryUnavailable(InventoryUnavailableData {
                order_id,
                reason: "out_of_stock".to_string(),
            }),
            OrderEvent::RefundConfirmed(RefundConfirmedData { order_id }),
        ];

        for event in events {
            assert!(topics::INBOUND.contains(&event.topic()));
        }
    }
}
