use crate::task::{RouteId, TaskId};
use serde::{Deserialize, Serialize};

/// Why a task exists
///
/// Set when the task is created and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOrigin {
    /// Configured starting point of a crawl
    Seed { publisher: String },

    /// Link found while processing another task
    Discovered {
        publisher: String,
        route_id: RouteId,
        parent_id: TaskId,
    },

    /// Explicit resubmission (for example a dead letter replayed by an operator)
    Retry { reason: String },

    /// Put back into the frontier during crash recovery
    Restored { source: String },
}

impl TaskOrigin {
    /// Short label used in logs and decision messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::Seed { .. } => "seed",
            Self::Discovered { .. } => "discovered",
            Self::Retry { .. } => "retry",
            Self::Restored { .. } => "restored",
        }
    }
}
