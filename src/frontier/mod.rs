//! Scheduling structures shared by all workers
//!
//! - `Frontier`: ready-to-run tasks, highest priority and earliest schedule first
//! - `InFlightBuffer`: tasks checked out for execution
//! - `RetryBuffer`: tasks deferred by politeness or backoff, keyed by eligibility
//! - `DeadLetterQueue`: terminal failures, append-only
//!
//! Each structure is individually thread-safe. Compound moves between them
//! (checkout, defer, promote) are coordinated by [`crate::state::RunState`].

mod dead_letter;
mod in_flight;
mod queue;
mod retry;

pub use dead_letter::{DeadLetterEntry, DeadLetterQueue};
pub use in_flight::InFlightBuffer;
pub use queue::{Frontier, OfferOutcome};
pub use retry::{RetryBuffer, RetryRecord};
