//! Time-keyed holding area for deferred tasks

use crate::state::lock;
use crate::task::ProcessingTask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::Notify;

/// A task waiting in the retry buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryRecord {
    pub task: ProcessingTask,
    pub eligible_at: DateTime<Utc>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct RetryInner {
    // (eligible_at, insertion seq) keeps equal instants in FIFO order
    records: BTreeMap<(DateTime<Utc>, u64), RetryRecord>,
    next_seq: u64,
}

/// Deferred tasks ordered by eligibility
///
/// Deferred tasks come from two places: politeness (host not ready yet) and
/// retry backoff after a transient failure.
#[derive(Debug, Default)]
pub struct RetryBuffer {
    inner: Mutex<RetryInner>,
    scheduled: Notify,
}

impl RetryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a deferred task until `eligible_at`
    pub fn schedule(
        &self,
        task: ProcessingTask,
        eligible_at: DateTime<Utc>,
        reason: impl Into<String>,
        error: Option<String>,
    ) {
        self.schedule_record(RetryRecord {
            task,
            eligible_at,
            reason: reason.into(),
            error,
        });
    }

    /// Stores a prepared record
    pub fn schedule_record(&self, record: RetryRecord) {
        {
            let mut inner = lock(&self.inner);
            let seq = inner.next_seq;
            inner.next_seq += 1;
            tracing::trace!(
                "Retry scheduled for {} at {} ({})",
                record.task.url(),
                record.eligible_at,
                record.reason
            );
            inner.records.insert((record.eligible_at, seq), record);
        }
        self.scheduled.notify_one();
    }

    /// Removes and returns up to `max` records with `eligible_at <= now`,
    /// earliest first
    ///
    /// # Arguments
    ///
    /// * `now` - Cut-off instant
    /// * `max` - Upper bound on records returned
    ///
    /// # Returns
    ///
    /// Ready records in eligibility order; ties keep scheduling order.
    pub fn drain_ready(&self, now: DateTime<Utc>, max: usize) -> Vec<RetryRecord> {
        let mut inner = lock(&self.inner);
        let mut ready = Vec::new();
        while ready.len() < max {
            let Some(entry) = inner.records.first_entry() else {
                break;
            };
            if entry.key().0 > now {
                break;
            }
            ready.push(entry.remove());
        }
        ready
    }

    /// Next wake-up time, without removing anything
    pub fn peek_eligible_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.inner).records.keys().next().map(|(at, _)| *at)
    }

    /// Waits until a record may have been scheduled
    pub async fn notified(&self) {
        self.scheduled.notified().await
    }

    pub fn size(&self) -> usize {
        lock(&self.inner).records.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).records.is_empty()
    }

    /// All records in eligibility order, without removing them
    pub fn snapshot(&self) -> Vec<RetryRecord> {
        lock(&self.inner).records.values().cloned().collect()
    }

    /// Replaces the whole content of the buffer
    pub fn replace(&self, records: impl IntoIterator<Item = RetryRecord>) {
        {
            let mut inner = lock(&self.inner);
            inner.records.clear();
            for record in records {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.records.insert((record.eligible_at, seq), record);
            }
        }
        self.scheduled.notify_one();
    }
}
