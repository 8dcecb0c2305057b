//! Audit trail of scheduling decisions
//!
//! Every accept/reject decision made while scheduling (enqueue, scope,
//! politeness, retry, dead-letter) is reported through a [`DecisionLog`] with
//! a stable machine-readable code and a human-readable message.

use crate::state::lock;
use crate::task::{ProcessingTask, TaskId};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Mutex;

/// Stable decision codes
///
/// The string form (see [`DecisionCode::as_str`]) is part of the crate's
/// observable output and does not change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionCode {
    EnqueueAccepted,
    EnqueueRejectedEmpty,
    EnqueueRejectedSelf,
    EnqueueRejectedInvalid,
    EnqueueRejectedScope,
    EnqueueRejectedDuplicate,
    EnqueueRejectedCapacity,
    ExecuteCompleted,
    ExecuteDiscarded,
    PolitenessDeferred,
    RetryScheduled,
    RetryPromoted,
    RetryPromotionRejected,
    DeadLettered,
}

impl DecisionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnqueueAccepted => "enqueue.accepted",
            Self::EnqueueRejectedEmpty => "enqueue.rejected.empty",
            Self::EnqueueRejectedSelf => "enqueue.rejected.self",
            Self::EnqueueRejectedInvalid => "enqueue.rejected.invalid",
            Self::EnqueueRejectedScope => "enqueue.rejected.scope",
            Self::EnqueueRejectedDuplicate => "enqueue.rejected.duplicate",
            Self::EnqueueRejectedCapacity => "enqueue.rejected.capacity",
            Self::ExecuteCompleted => "execute.completed",
            Self::ExecuteDiscarded => "execute.discarded",
            Self::PolitenessDeferred => "politeness.deferred",
            Self::RetryScheduled => "retry.scheduled",
            Self::RetryPromoted => "retry.promoted",
            Self::RetryPromotionRejected => "retry.promotion_rejected",
            Self::DeadLettered => "dead_letter.recorded",
        }
    }

    /// Checks if the code reports a rejection
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::EnqueueRejectedEmpty
                | Self::EnqueueRejectedSelf
                | Self::EnqueueRejectedInvalid
                | Self::EnqueueRejectedScope
                | Self::EnqueueRejectedDuplicate
                | Self::EnqueueRejectedCapacity
                | Self::RetryPromotionRejected
        )
    }
}

impl fmt::Display for DecisionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded decision
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub code: DecisionCode,
    pub message: String,
    pub task_id: Option<TaskId>,
    pub url: Option<String>,
    pub at: DateTime<Utc>,
}

impl Decision {
    pub fn new(code: DecisionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            task_id: None,
            url: None,
            at: Utc::now(),
        }
    }

    /// Decision about `task`
    pub fn for_task(code: DecisionCode, task: &ProcessingTask, message: impl Into<String>) -> Self {
        Self {
            task_id: Some(task.id().clone()),
            url: Some(task.url().to_string()),
            ..Self::new(code, message)
        }
    }

    /// Decision about a URL that never became a task
    pub fn for_url(code: DecisionCode, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::new(code, message)
        }
    }
}

/// Receives decisions
pub trait DecisionLog: Send + Sync {
    fn record(&self, decision: Decision);
}

/// Emits every decision as a `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDecisionLog;

impl DecisionLog for TracingDecisionLog {
    fn record(&self, decision: Decision) {
        let task_id = decision.task_id.as_ref().map(TaskId::as_str).unwrap_or("-");
        let url = decision.url.as_deref().unwrap_or("-");
        match decision.code {
            DecisionCode::DeadLettered => tracing::warn!(
                code = decision.code.as_str(),
                task_id,
                url,
                "{}",
                decision.message
            ),
            DecisionCode::ExecuteCompleted | DecisionCode::RetryScheduled => tracing::info!(
                code = decision.code.as_str(),
                task_id,
                url,
                "{}",
                decision.message
            ),
            _ => tracing::debug!(
                code = decision.code.as_str(),
                task_id,
                url,
                "{}",
                decision.message
            ),
        }
    }
}

/// Keeps decisions in memory; used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryDecisionLog {
    decisions: Mutex<Vec<Decision>>,
}

impl MemoryDecisionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decisions(&self) -> Vec<Decision> {
        lock(&self.decisions).clone()
    }

    /// Number of decisions recorded with `code`
    pub fn count(&self, code: DecisionCode) -> usize {
        lock(&self.decisions)
            .iter()
            .filter(|d| d.code == code)
            .count()
    }
}

impl DecisionLog for MemoryDecisionLog {
    fn record(&self, decision: Decision) {
        lock(&self.decisions).push(decision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(DecisionCode::EnqueueAccepted.as_str(), "enqueue.accepted");
        assert_eq!(
            DecisionCode::EnqueueRejectedDuplicate.to_string(),
            "enqueue.rejected.duplicate"
        );
        assert!(DecisionCode::EnqueueRejectedScope.is_rejection());
        assert!(!DecisionCode::RetryScheduled.is_rejection());
    }

    #[test]
    fn test_memory_log_counts_by_code() {
        let log = MemoryDecisionLog::new();
        log.record(Decision::for_url(
            DecisionCode::EnqueueRejectedInvalid,
            "ftp://x",
            "bad scheme",
        ));
        log.record(Decision::new(DecisionCode::EnqueueAccepted, "ok"));
        log.record(Decision::new(DecisionCode::EnqueueAccepted, "ok"));

        assert_eq!(log.count(DecisionCode::EnqueueAccepted), 2);
        assert_eq!(log.decisions()[0].url.as_deref(), Some("ftp://x"));
    }
}
