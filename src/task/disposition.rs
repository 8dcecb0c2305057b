use crate::task::RouteId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of a successful task execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Route whose pipeline finished the task
    pub route_id: RouteId,

    /// HTTP status of the fetch, if the pipeline fetched anything
    pub status: Option<u16>,

    /// Media type of the fetched content
    pub media_type: Option<String>,

    /// Document title, if the parser found one
    pub title: Option<String>,

    /// Links offered to the enqueue logic
    pub links_found: usize,

    /// Links that became new frontier tasks
    pub links_accepted: usize,

    /// Number of route hops taken
    pub hops: usize,
}

/// Outcome of one execution attempt
///
/// Produced exactly once per attempt by the engine's `execute` and consumed
/// exactly once by `apply`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskDisposition {
    Completed {
        result: TaskResult,
    },
    Discarded {
        reason: String,
    },
    RetryLater {
        eligible_at: DateTime<Utc>,
        reason: String,
        error: String,
        stage_id: String,
        route_id: RouteId,
    },
    DeadLetter {
        reason: String,
        error: Option<String>,
        stage_id: String,
        route_id: RouteId,
    },
}

impl TaskDisposition {
    /// Stable lowercase name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Discarded { .. } => "discarded",
            Self::RetryLater { .. } => "retry_later",
            Self::DeadLetter { .. } => "dead_letter",
        }
    }
}

/// What the retry policy wants done with a failed attempt
///
/// Pure data: deciding has no side effects.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry {
        eligible_at: DateTime<Utc>,
        reason: String,
    },
    Discard {
        reason: String,
    },
    DeadLetter {
        reason: String,
    },
}

/// Terminal failure record, written once to the dead-letter queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterItem {
    pub failed_at: DateTime<Utc>,
    pub reason: String,
    pub stage_id: String,
    pub route_id: RouteId,
    /// Number of attempts made, including the one that failed
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_kinds() {
        let discarded = TaskDisposition::Discarded {
            reason: "already processed".to_string(),
        };
        assert_eq!(discarded.kind(), "discarded");

        let dead = TaskDisposition::DeadLetter {
            reason: "No route resolved".to_string(),
            error: None,
            stage_id: "pipeline".to_string(),
            route_id: RouteId::unknown(),
        };
        assert_eq!(dead.kind(), "dead_letter");
    }
}
