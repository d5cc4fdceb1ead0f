//! Value objects for the checkout domain.

use serde::{Deserialize, Serialize};

/// Product identifier (SKU).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(String);

impl Sku {
    /// Creates a new SKU from a string.
    pub fn new(sku: impl Into<String>) -> Self {
        Self(sku.into())
    }

    /// Returns the SKU as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Sku {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Sku {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Sku {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Sku {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Money amount represented in cents to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a dollar value.
    pub fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars * 100,
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Adds another money amount. Returns `None` if the sum does not
    /// fit in an `i64` cent count.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.cents
            .checked_add(other.cents)
            .map(|cents| Money { cents })
    }

    /// Multiplies by a quantity. Returns `None` on overflow.
    ///
    /// Quantities and prices come straight off the wire, so overflow
    /// here is an input to reject, not a bug to panic on.
    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(|cents| Money { cents })
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}.{:02}", self.cents / 100, self.cents.abs() % 100)
    }
}

/// One line of a checkout. Immutable after the checkout is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// The product being purchased.
    pub sku: Sku,

    /// Quantity ordered.
    pub quantity: u32,

    /// Unit price at checkout time.
    pub unit_price: Money,
}

impl LineItem {
    /// Creates a new line item.
    pub fn new(sku: impl Into<Sku>, quantity: u32, unit_price: Money) -> Self {
        Self {
            sku: sku.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns the line total (unit price times quantity), or `None`
    /// if it overflows.
    pub fn total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// Identifier correlating to one payment attempt, assigned by the
/// payment provider when a charge is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentAttemptId(String);

impl PaymentAttemptId {
    /// Creates a payment attempt ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PaymentAttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PaymentAttemptId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PaymentAttemptId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier for an inventory hold, assigned by the inventory
/// provider when a reservation succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(String);

impl ReservationId {
    /// Creates a reservation ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ReservationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReservationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_from_dollars() {
        let money = Money::from_dollars(10);
        assert_eq!(money.cents(), 1000);
    }

    #[test]
    fn money_arithmetic() {
        let a = Money::from_cents(1050);
        let b = Money::from_cents(250);
        assert_eq!(a.checked_add(b), Some(Money::from_cents(1300)));
        assert_eq!(b.checked_mul(3), Some(Money::from_cents(750)));
    }

    #[test]
    fn money_overflow_is_none_not_a_panic() {
        let huge = Money::from_cents(i64::MAX);
        assert_eq!(huge.checked_mul(2), None);
        assert_eq!(huge.checked_add(Money::from_cents(1)), None);
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(1050).to_string(), "$10.50");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
    }

    #[test]
    fn line_item_total() {
        let item = LineItem::new("SKU-1", 3, Money::from_dollars(10));
        assert_eq!(item.total(), Some(Money::from_cents(3000)));
    }

    #[test]
    fn line_item_total_overflow_is_none() {
        let item = LineItem::new("SKU-BIG", u32::MAX, Money::from_cents(i64::MAX / 2));
        assert_eq!(item.total(), None);
    }

    #[test]
    fn sku_serializes_as_plain_string() {
        let sku = Sku::new("SKU-1");
        assert_eq!(serde_json::to_string(&sku).unwrap(), "\"SKU-1\"");
    }
}
