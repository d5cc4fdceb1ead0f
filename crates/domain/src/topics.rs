//! Bus topic names for the checkout saga.
//!
//! Topics follow the `{collaborator}.{message}` convention. Inbound
//! topics carry provider events consumed by the orchestrator; outbound
//! topics carry the commands it emits.

/// Checkout intake event.
pub const CHECKOUT_REQUESTED: &str = "checkout.requested";

/// Payment provider events.
pub const PAYMENT_CONFIRMED: &str = "payment.confirmed";
pub const PAYMENT_DECLINED: &str = "payment.declined";
pub const REFUND_CONFIRMED: &str = "payment.refund_confirmed";

/// Inventory provider events.
pub const INVENTORY_RESERVED: &str = "inventory.reserved";
pub const INVENTORY_UNAVAILABLE: &str = "inventory.unavailable";

/// Commands to the payment provider.
pub const CHARGE_PAYMENT: &str = "payment.charge";
pub const REFUND_PAYMENT: &str = "payment.refund";

/// Commands to the inventory provider.
pub const RESERVE_INVENTORY: &str = "inventory.reserve";
pub const RELEASE_RESERVATION: &str = "inventory.release";

/// Commands to the notification provider (fire-and-forget).
pub const SEND_CONFIRMATION: &str = "notification.confirmation";
pub const NOTIFY_FAILURE: &str = "notification.failure";

/// All topics the orchestrator consumes.
pub const INBOUND: &[&str] = &[
    CHECKOUT_REQUESTED,
    PAYMENT_CONFIRMED,
    PAYMENT_DECLINED,
    REFUND_CONFIRMED,
    INVENTORY_RESERVED,
    INVENTORY_UNAVAILABLE,
];
