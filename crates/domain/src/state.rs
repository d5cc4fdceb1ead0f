//! Order state machine states.

use serde::{Deserialize, Serialize};

/// The state of an order as it moves through the checkout saga.
///
/// ```text
/// Created ──► PaymentPending ──► ReservationPending ──► Completed
///                  │                     │
///                  │                     └──► CompensatingPayment
///                  │                                   │
///                  └───────────────────────────────────┴──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderState {
    /// Checkout has not been requested yet.
    #[default]
    Created,

    /// Charge command issued, awaiting the payment provider's verdict.
    PaymentPending,

    /// Payment confirmed, awaiting the inventory reservation.
    ReservationPending,

    /// Reservation failed after a successful charge; refund issued,
    /// awaiting its confirmation.
    CompensatingPayment,

    /// Payment and reservation both succeeded (terminal state).
    Completed,

    /// The order could not be fulfilled (terminal state).
    Failed,
}

impl OrderState {
    /// Returns true if this is a terminal state (no further
    /// transitions are accepted).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Completed | OrderState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Created => "Created",
            OrderState::PaymentPending => "PaymentPending",
            OrderState::ReservationPending => "ReservationPending",
            OrderState::CompensatingPayment => "CompensatingPayment",
            OrderState::Completed => "Completed",
            OrderState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
