//! Checkout saga orchestration.
//!
//! Ties the other crates together: workers consume provider events
//! from the bus, the orchestrator deduplicates each one and lets the
//! order aggregate decide the transition, the state store persists
//! aggregate and outbox atomically, and the dispatcher publishes the
//! resulting commands back onto the bus. Correctness relies on
//! per-order optimistic concurrency, not locks: racing workers resolve
//! by one saving and the other reloading.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod worker;

pub use config::Config;
pub use dispatcher::OutboxDispatcher;
pub use error::{ErrorClass, OrchestratorError, Result};
pub use orchestrator::{HandleOutcome, Orchestrator};
pub use worker::Worker;
