//! Checkout order domain.
//!
//! The heart of the crate is the [`Order`] aggregate: a finite state
//! machine that consumes provider events and decides which commands to
//! emit next. It holds no I/O; persistence and messaging live in the
//! surrounding crates, which feed it events and carry out the commands
//! it returns.

pub mod aggregate;
pub mod commands;
pub mod error;
pub mod events;
pub mod state;
pub mod topics;
pub mod value_objects;

pub use aggregate::{EventOutcome, Order};
pub use commands::OrderCommand;
pub use error::{OrderError, Result};
pub use events::OrderEvent;
pub use state::OrderState;
pub use value_objects::{LineItem, Money, PaymentAttemptId, ReservationId, Sku};
