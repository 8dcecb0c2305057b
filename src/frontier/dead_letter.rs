//! Terminal store for unrecoverable task failures

use crate::state::lock;
use crate::task::{DeadLetterItem, ProcessingTask, TaskId};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A dead task together with the failure record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub task: ProcessingTask,
    pub item: DeadLetterItem,
}

/// Append-only dead-letter queue
///
/// Entries are never mutated, removed or retried automatically. Replaying a
/// dead letter is an explicit operator action that creates a new task.
#[derive(Debug, Default)]
pub struct DeadLetterQueue {
    entries: Mutex<Vec<DeadLetterEntry>>,
}

impl DeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, task: ProcessingTask, item: DeadLetterItem) {
        tracing::debug!("Dead-lettering {}: {}", task.url(), item.reason);
        lock(&self.entries).push(DeadLetterEntry { task, item });
    }

    /// Latest entry for a task id
    pub fn find(&self, id: &TaskId) -> Option<DeadLetterEntry> {
        lock(&self.entries)
            .iter()
            .rev()
            .find(|entry| entry.task.id() == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// All entries in insertion order
    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        lock(&self.entries).clone()
    }

    /// Replaces the content; only used when installing recovered state
    pub(crate) fn replace(&self, entries: Vec<DeadLetterEntry>) {
        *lock(&self.entries) = entries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::RouteId;
    use chrono::Utc;
    use url::Url;

    fn item(reason: &str) -> DeadLetterItem {
        DeadLetterItem {
            failed_at: Utc::now(),
            reason: reason.to_string(),
            stage_id: "fetch".to_string(),
            route_id: RouteId::new("route:crawl"),
            attempts: 3,
            error: Some("HTTP 403".to_string()),
        }
    }

    #[test]
    fn test_put_appends() {
        let queue = DeadLetterQueue::new();
        let url = Url::parse("https://example.com/").unwrap();
        let task = ProcessingTask::seed(url, "test", 0, Utc::now());
        let id = task.id().clone();

        queue.put(task, item("forbidden"));
        assert_eq!(queue.len(), 1);

        let entry = queue.find(&id).unwrap();
        assert_eq!(entry.item.reason, "forbidden");
        assert_eq!(entry.item.attempts, 3);
    }
}
