//! The ready-to-run work queue

use crate::state::lock;
use crate::task::ProcessingTask;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Result of offering a task to the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferOutcome {
    Accepted,
    /// The frontier refused the task; the caller must record the rejection
    Rejected { reason: String },
}

impl OfferOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// A task in the heap, with an insertion sequence for FIFO tie-breaking
#[derive(Debug)]
struct FrontierEntry {
    task: ProcessingTask,
    seq: u64,
}

// BinaryHeap pops the greatest entry first: higher priority, then earlier
// scheduled_at, then earlier insertion.
impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.task
            .priority()
            .cmp(&other.task.priority())
            .then_with(|| other.task.scheduled_at().cmp(&self.task.scheduled_at()))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for FrontierEntry {}

#[derive(Debug, Default)]
struct FrontierInner {
    heap: BinaryHeap<FrontierEntry>,
    next_seq: u64,
}

/// Priority queue of tasks ready for execution
///
/// Ordered by `(priority desc, scheduled_at asc)`, ties broken by insertion
/// order. An optional capacity turns excess offers into explicit rejections;
/// nothing is ever dropped silently.
#[derive(Debug, Default)]
pub struct Frontier {
    inner: Mutex<FrontierInner>,
    capacity: Option<usize>,
    work_available: Notify,
}

impl Frontier {
    /// Creates an unbounded frontier
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a frontier that rejects offers beyond `capacity` tasks
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Inserts a task
    ///
    /// # Returns
    ///
    /// * `OfferOutcome::Accepted` - The task is queued and a waiting consumer is woken
    /// * `OfferOutcome::Rejected` - The frontier is at capacity
    pub fn offer(&self, task: ProcessingTask) -> OfferOutcome {
        {
            let mut inner = lock(&self.inner);
            if let Some(capacity) = self.capacity {
                if inner.heap.len() >= capacity {
                    tracing::trace!("Frontier full, rejecting {}", task.url());
                    return OfferOutcome::Rejected {
                        reason: format!("frontier at capacity ({})", capacity),
                    };
                }
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(FrontierEntry { task, seq });
        }
        self.work_available.notify_one();
        OfferOutcome::Accepted
    }

    /// Removes and returns the next task, or `None` if the frontier is empty
    pub fn poll(&self) -> Option<ProcessingTask> {
        lock(&self.inner).heap.pop().map(|entry| entry.task)
    }

    /// Waits until a task may have been offered
    ///
    /// Wake-ups are hints; callers must poll again and tolerate finding
    /// nothing.
    pub async fn notified(&self) {
        self.work_available.notified().await
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).heap.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).heap.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// All queued tasks in poll order, without removing them
    pub fn snapshot(&self) -> Vec<ProcessingTask> {
        let inner = lock(&self.inner);
        let mut entries: Vec<&FrontierEntry> = inner.heap.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|entry| entry.task.clone()).collect()
    }

    /// Replaces the content of the frontier, bypassing the capacity check
    ///
    /// Used when installing recovered state; a restore must never lose tasks.
    pub fn replace(&self, tasks: impl IntoIterator<Item = ProcessingTask>) {
        {
            let mut inner = lock(&self.inner);
            inner.heap.clear();
            for task in tasks {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.heap.push(FrontierEntry { task, seq });
            }
        }
        self.work_available.notify_waiters();
    }
}
