//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlState` / `SeenStore`: which URLs were discovered and which were processed
//! - `DomainState`: per-host request bookkeeping used by politeness
//! - `RunState`: the run-level bundle of shared scheduling structures, with
//!   every compound mutation journaled to the durability layer

mod domain_state;
mod run_state;
mod seen;
mod url_state;

// Re-export main types
pub use domain_state::DomainState;
pub use run_state::RunState;
pub use seen::{SeenEntry, SeenStore};
pub use url_state::UrlState;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the guard if a previous holder panicked
///
/// Every structure guarded this way is left consistent before its lock is
/// released, so a poisoned guard is still safe to use.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
