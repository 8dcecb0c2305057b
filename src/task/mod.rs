//! Task identity and lineage
//!
//! Tasks are immutable values. Every scheduling transition (a new attempt,
//! a politeness deferral, a restore after a crash) produces a new
//! `ProcessingTask` instead of mutating the existing one.
//!
//! # Components
//!
//! - `TaskId` / `RouteId`: opaque identifiers
//! - `TraceContext`: ancestry correlation for observability
//! - `TaskOrigin`: why a task exists
//! - `ProcessingTask`: the unit of work
//! - `TaskDisposition` / `RetryDecision` / `DeadLetterItem`: attempt outcomes

mod disposition;
mod id;
mod origin;
#[allow(clippy::module_inception)]
mod task;
mod trace;

pub use disposition::{DeadLetterItem, RetryDecision, TaskDisposition, TaskResult};
pub use id::{RouteId, TaskId};
pub use origin::TaskOrigin;
pub use task::ProcessingTask;
pub use trace::TraceContext;
