//! Run-level bundle of the shared scheduling structures

use crate::frontier::{
    DeadLetterEntry, DeadLetterQueue, Frontier, InFlightBuffer, OfferOutcome, RetryBuffer,
    RetryRecord,
};
use crate::state::{lock, SeenStore};
use crate::storage::{Journal, RecoveredState, Snapshot, StateEvent, StorageResult, SNAPSHOT_VERSION};
use crate::task::{DeadLetterItem, ProcessingTask, TaskId};
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Result of moving eligible retry records back to the frontier
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PromoteOutcome {
    /// Tasks now in the frontier
    pub promoted: Vec<TaskId>,
    /// Tasks the frontier refused, with the refusal reason; they stay in the
    /// retry buffer with a later eligibility
    pub rejected: Vec<(ProcessingTask, String)>,
}

/// Shared scheduling state of one crawl run
///
/// Individual structures are thread-safe on their own. Every operation that
/// moves a task between structures, or changes what must survive a crash,
/// goes through a `RunState` method: the mutation and its journal record
/// happen inside one critical section (the journal lock), so log order
/// equals mutation order and idle checks never see a task in transit.
///
/// Without an attached journal the same operations run purely in memory.
#[derive(Default)]
pub struct RunState {
    frontier: Frontier,
    in_flight: InFlightBuffer,
    retry: RetryBuffer,
    seen: SeenStore,
    dead_letters: DeadLetterQueue,
    journal: Mutex<Option<Journal>>,
}

impl RunState {
    /// Creates an empty state; `frontier_capacity` bounds the frontier
    pub fn new(frontier_capacity: Option<usize>) -> Self {
        let frontier = match frontier_capacity {
            Some(capacity) => Frontier::bounded(capacity),
            None => Frontier::new(),
        };
        Self {
            frontier,
            ..Self::default()
        }
    }

    /// Runs `op` and journals the event it returns, inside the critical section
    fn commit<R>(&self, op: impl FnOnce() -> (R, Option<StateEvent>)) -> StorageResult<R> {
        let mut guard = lock(&self.journal);
        let (result, event) = op();

        if let (Some(journal), Some(event)) = (guard.as_mut(), event) {
            let now = Utc::now();
            journal.record(event, now)?;
            if journal.checkpoint_due(now) {
                let snapshot = self.capture_snapshot(journal, now);
                journal.commit_snapshot(&snapshot)?;
            }
        }
        Ok(result)
    }

    /// Offers a task to the frontier
    ///
    /// # Returns
    ///
    /// * `Ok(OfferOutcome::Accepted)` - The task is queued and journaled
    /// * `Ok(OfferOutcome::Rejected)` - The frontier is full; nothing was journaled
    /// * `Err(StorageError)` - Journaling failed
    pub fn offer(&self, task: ProcessingTask) -> StorageResult<OfferOutcome> {
        self.commit(|| {
            let event = StateEvent::Offered { task: task.clone() };
            match self.frontier.offer(task) {
                OfferOutcome::Accepted => (OfferOutcome::Accepted, Some(event)),
                rejected => (rejected, None),
            }
        })
    }

    /// Takes the next task from the frontier and registers it as in flight
    ///
    /// # Returns
    ///
    /// * `Ok(Some(task))` - The task now belongs to the caller until released,
    ///   deferred or dead-lettered
    /// * `Ok(None)` - The frontier is empty
    pub fn checkout(&self) -> StorageResult<Option<ProcessingTask>> {
        self.commit(|| match self.frontier.poll() {
            Some(task) => {
                let event = StateEvent::CheckedOut {
                    id: task.id().clone(),
                };
                self.in_flight.put(task.clone());
                (Some(task), Some(event))
            }
            None => (None, None),
        })
    }

    /// Unregisters a finished (completed or discarded) task
    pub fn release(&self, id: &TaskId) -> StorageResult<Option<ProcessingTask>> {
        self.commit(|| match self.in_flight.remove(id) {
            Some(task) => (Some(task), Some(StateEvent::Released { id: id.clone() })),
            None => (None, None),
        })
    }

    /// Moves an in-flight task to the retry buffer
    ///
    /// Used both for retry backoff and for politeness deferrals.
    ///
    /// # Arguments
    ///
    /// * `record` - The task with its eligibility time and reason
    pub fn defer(&self, record: RetryRecord) -> StorageResult<()> {
        self.commit(|| {
            self.in_flight.remove(record.task.id());
            self.retry.schedule_record(record.clone());
            ((), Some(StateEvent::Deferred { record }))
        })
    }

    /// Moves an in-flight task to the dead-letter queue
    pub fn dead_letter(&self, task: ProcessingTask, item: DeadLetterItem) -> StorageResult<()> {
        self.commit(|| {
            self.in_flight.remove(task.id());
            let entry = DeadLetterEntry { task, item };
            self.dead_letters.put(entry.task.clone(), entry.item.clone());
            ((), Some(StateEvent::DeadLettered { entry }))
        })
    }

    /// Moves up to `max` eligible retry records to the frontier
    ///
    /// Records the frontier refuses are rescheduled `retry_after` from now.
    ///
    /// # Arguments
    ///
    /// * `now` - Records eligible at or before this instant are promoted
    /// * `max` - Upper bound on records taken in one call
    /// * `retry_after` - Postponement for records the frontier rejects
    ///
    /// # Returns
    ///
    /// * `Ok(PromoteOutcome)` - Ids now in the frontier and the tasks it refused
    pub fn promote_ready(
        &self,
        now: DateTime<Utc>,
        max: usize,
        retry_after: Duration,
    ) -> StorageResult<PromoteOutcome> {
        self.commit(|| {
            let ready = self.retry.drain_ready(now, max);
            if ready.is_empty() {
                return (PromoteOutcome::default(), None);
            }

            let mut outcome = PromoteOutcome::default();
            let mut rescheduled = Vec::new();
            for record in ready {
                let id = record.task.id().clone();
                match self.frontier.offer(record.task.clone()) {
                    OfferOutcome::Accepted => outcome.promoted.push(id),
                    OfferOutcome::Rejected { reason } => {
                        let record = RetryRecord {
                            eligible_at: now + retry_after,
                            ..record
                        };
                        self.retry.schedule_record(record.clone());
                        outcome.rejected.push((record.task.clone(), reason));
                        rescheduled.push(record);
                    }
                }
            }

            let event = StateEvent::Promoted {
                ids: outcome.promoted.clone(),
                rescheduled,
            };
            (outcome, Some(event))
        })
    }

    /// Records a URL as discovered; `false` if it was already known
    pub fn mark_discovered(&self, url: &str) -> StorageResult<bool> {
        self.commit(|| {
            if self.seen.mark_discovered(url) {
                let event = StateEvent::Discovered {
                    url: url.to_string(),
                };
                (true, Some(event))
            } else {
                (false, None)
            }
        })
    }

    /// Records a URL as processed; `false` if it already was
    pub fn mark_processed(&self, url: &str) -> StorageResult<bool> {
        self.commit(|| {
            if self.seen.mark_processed(url) {
                let event = StateEvent::Processed {
                    url: url.to_string(),
                };
                (true, Some(event))
            } else {
                (false, None)
            }
        })
    }

    /// Replays a dead letter by hand as a brand new task
    ///
    /// The dead-letter entry itself stays untouched.
    ///
    /// # Arguments
    ///
    /// * `id` - Task id of the dead letter to replay
    /// * `reason` - Recorded as the source of the new task
    /// * `now` - Creation time of the new task
    ///
    /// # Returns
    ///
    /// * `Ok(Some((task, outcome)))` - The new task and whether the frontier took it
    /// * `Ok(None)` - No dead letter has this id
    pub fn requeue_dead_letter(
        &self,
        id: &TaskId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<(ProcessingTask, OfferOutcome)>> {
        let Some(entry) = self.dead_letters.find(id) else {
            return Ok(None);
        };
        let task = entry.task.resubmitted(reason, now);
        tracing::info!(
            "Requeueing dead letter {} as {} ({})",
            id,
            task.id(),
            task.url()
        );
        let outcome = self.offer(task.clone())?;
        Ok(Some((task, outcome)))
    }

    /// True when nothing is queued, running or waiting for a retry
    pub fn is_idle(&self) -> bool {
        let _guard = lock(&self.journal);
        self.frontier.is_empty() && self.in_flight.size() == 0 && self.retry.is_empty()
    }

    fn capture_snapshot(&self, journal: &Journal, now: DateTime<Utc>) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            sequence: journal.last_sequence(),
            taken_at: now,
            config_hash: journal.config_hash().map(str::to_string),
            frontier: self.frontier.snapshot(),
            in_flight: self.in_flight.snapshot(),
            retry: self.retry.snapshot(),
            seen: self.seen.entries(),
            dead_letters: self.dead_letters.entries(),
        }
    }

    /// Replaces all structures with recovered state
    pub fn install(&self, recovered: &RecoveredState) {
        let _guard = lock(&self.journal);
        self.frontier.replace(recovered.frontier());
        self.in_flight.drain_all();
        for task in recovered.in_flight() {
            self.in_flight.put(task);
        }
        self.retry.replace(recovered.retry());
        self.seen.replace(recovered.seen());
        self.dead_letters.replace(recovered.dead_letters().to_vec());
    }

    /// Starts journaling every subsequent operation
    pub fn attach_journal(&self, journal: Journal) {
        *lock(&self.journal) = Some(journal);
    }

    pub fn has_journal(&self) -> bool {
        lock(&self.journal).is_some()
    }

    /// Writes a snapshot and rotates the WAL; no-op without a journal
    pub fn checkpoint(&self) -> StorageResult<()> {
        let mut guard = lock(&self.journal);
        if let Some(journal) = guard.as_mut() {
            let snapshot = self.capture_snapshot(journal, Utc::now());
            journal.commit_snapshot(&snapshot)?;
        }
        Ok(())
    }

    /// Forces buffered WAL records to disk
    pub fn flush_journal(&self) -> StorageResult<()> {
        match lock(&self.journal).as_mut() {
            Some(journal) => journal.flush(),
            None => Ok(()),
        }
    }

    /// Flushes buffered WAL records whose time threshold has passed
    pub fn flush_journal_if_due(&self) -> StorageResult<()> {
        match lock(&self.journal).as_mut() {
            Some(journal) => journal.flush_if_due(),
            None => Ok(()),
        }
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn in_flight(&self) -> &InFlightBuffer {
        &self.in_flight
    }

    pub fn retry(&self) -> &RetryBuffer {
        &self.retry
    }

    pub fn seen(&self) -> &SeenStore {
        &self.seen
    }

    pub fn dead_letters(&self) -> &DeadLetterQueue {
        &self.dead_letters
    }
}
