//! Scheduling policies
//!
//! Policies are decision functions: they look at a task (and for retries, an
//! error and the current time) and say what should happen. Applying the
//! decision is left to the engine and coordinator.
//!
//! - `ScopePolicy`: may this task run at all?
//! - `PolitenessPolicy`: when may it run?
//! - `RetryPolicy`: what happens after a failed attempt?

mod politeness;
mod retry;
mod scope;

pub use politeness::{HostPolitenessPolicy, Immediate, PolitenessPolicy};
pub use retry::{BackoffRetryPolicy, RetryPolicy, RATE_LIMITED_REASON};
pub use scope::{AllOf, AllowAll, DepthScope, DomainScope, RobotsScope, ScopePolicy};
