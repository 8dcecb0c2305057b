//! Crash recovery: snapshot load, WAL replay, in-flight requeue
//!
//! Recovery is two-phase. First a [`RecoveredState`] is rebuilt off to the
//! side from the committed snapshot plus every newer WAL record. Only then
//! is it installed into the live [`RunState`] and the journal attached, so
//! workers never observe a half-restored state.

use crate::config::DurabilityConfig;
use crate::frontier::{DeadLetterEntry, RetryRecord};
use crate::state::{RunState, SeenEntry, UrlState};
use crate::storage::journal::{StateEvent, WalRecord};
use crate::storage::wal::read_log;
use crate::storage::{
    snapshot_repository, wal_path, JsonCodec, Journal, Snapshot, StorageError, StorageResult,
};
use crate::task::{ProcessingTask, TaskId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Origin source given to tasks requeued from the in-flight buffer
pub const IN_FLIGHT_SOURCE: &str = "in-flight";

/// Scheduling state rebuilt from persistence, not yet installed
#[derive(Debug, Default)]
pub struct RecoveredState {
    frontier: HashMap<TaskId, (u64, ProcessingTask)>,
    in_flight: HashMap<TaskId, ProcessingTask>,
    retry: HashMap<TaskId, (u64, RetryRecord)>,
    seen: HashMap<String, UrlState>,
    dead_letters: Vec<DeadLetterEntry>,
    next_order: u64,
    sequence: u64,
    snapshot_sequence: Option<u64>,
    config_hash: Option<String>,
    replayed: usize,
}

impl RecoveredState {
    /// Starts from a snapshot (or nothing) and replays newer records
    pub fn rebuild(snapshot: Option<Snapshot>, records: Vec<WalRecord>) -> Self {
        let mut state = Self::default();
        if let Some(snapshot) = snapshot {
            state.load_snapshot(snapshot);
        }

        for record in records {
            if record.seq <= state.sequence {
                tracing::trace!("Skipping WAL record {} (already in snapshot)", record.seq);
                continue;
            }
            state.apply(record.event);
            state.sequence = record.seq;
            state.replayed += 1;
        }
        state
    }

    fn load_snapshot(&mut self, snapshot: Snapshot) {
        self.sequence = snapshot.sequence;
        self.snapshot_sequence = Some(snapshot.sequence);
        self.config_hash = snapshot.config_hash;
        for task in snapshot.frontier {
            self.push_frontier(task);
        }
        for task in snapshot.in_flight {
            self.in_flight.insert(task.id().clone(), task);
        }
        for record in snapshot.retry {
            self.push_retry(record);
        }
        self.seen = snapshot
            .seen
            .into_iter()
            .map(|entry| (entry.url, entry.state))
            .collect();
        self.dead_letters = snapshot.dead_letters;
    }

    /// Applies one journaled transition
    pub fn apply(&mut self, event: StateEvent) {
        match event {
            StateEvent::Offered { task } => self.push_frontier(task),
            StateEvent::CheckedOut { id } => match self.frontier.remove(&id) {
                Some((_, task)) => {
                    self.in_flight.insert(id, task);
                }
                None => tracing::warn!("Replay: checkout of unknown task {}", id),
            },
            StateEvent::Released { id } => {
                self.in_flight.remove(&id);
            }
            StateEvent::Deferred { record } => {
                self.in_flight.remove(record.task.id());
                self.push_retry(record);
            }
            StateEvent::DeadLettered { entry } => {
                self.in_flight.remove(entry.task.id());
                self.dead_letters.push(entry);
            }
            StateEvent::Promoted { ids, rescheduled } => {
                for id in ids {
                    match self.retry.remove(&id) {
                        Some((_, record)) => self.push_frontier(record.task),
                        None => tracing::warn!("Replay: promotion of unknown task {}", id),
                    }
                }
                for record in rescheduled {
                    self.retry.remove(record.task.id());
                    self.push_retry(record);
                }
            }
            StateEvent::Discovered { url } => {
                self.seen.entry(url).or_insert(UrlState::Discovered);
            }
            StateEvent::Processed { url } => {
                self.seen.insert(url, UrlState::Processed);
            }
        }
    }

    /// Moves every in-flight task back to the frontier
    ///
    /// A checked-out task with no recorded disposition is assumed
    /// interrupted. Returns the number of tasks requeued.
    pub fn requeue_in_flight(&mut self) -> usize {
        let mut interrupted: Vec<ProcessingTask> = self.in_flight.drain().map(|(_, t)| t).collect();
        interrupted.sort_by(|a, b| {
            a.scheduled_at()
                .cmp(&b.scheduled_at())
                .then_with(|| a.id().cmp(b.id()))
        });

        let count = interrupted.len();
        for task in interrupted {
            tracing::debug!("Requeueing interrupted task {} ({})", task.id(), task.url());
            self.push_frontier(task.restored(IN_FLIGHT_SOURCE));
        }
        count
    }

    fn push_frontier(&mut self, task: ProcessingTask) {
        let order = self.next_order;
        self.next_order += 1;
        self.frontier.insert(task.id().clone(), (order, task));
    }

    fn push_retry(&mut self, record: RetryRecord) {
        let order = self.next_order;
        self.next_order += 1;
        self.retry.insert(record.task.id().clone(), (order, record));
    }

    /// Frontier tasks in insertion order
    pub fn frontier(&self) -> Vec<ProcessingTask> {
        let mut tasks: Vec<&(u64, ProcessingTask)> = self.frontier.values().collect();
        tasks.sort_by_key(|(order, _)| *order);
        tasks.into_iter().map(|(_, task)| task.clone()).collect()
    }

    pub fn in_flight(&self) -> Vec<ProcessingTask> {
        let mut tasks: Vec<ProcessingTask> = self.in_flight.values().cloned().collect();
        tasks.sort_by(|a, b| a.id().cmp(b.id()));
        tasks
    }

    /// Retry records in eligibility order
    pub fn retry(&self) -> Vec<RetryRecord> {
        let mut records: Vec<&(u64, RetryRecord)> = self.retry.values().collect();
        records.sort_by(|(oa, a), (ob, b)| a.eligible_at.cmp(&b.eligible_at).then(oa.cmp(ob)));
        records.into_iter().map(|(_, record)| record.clone()).collect()
    }

    pub fn seen(&self) -> Vec<SeenEntry> {
        let mut entries: Vec<SeenEntry> = self
            .seen
            .iter()
            .map(|(url, state)| SeenEntry {
                url: url.clone(),
                state: *state,
            })
            .collect();
        entries.sort_by(|a, b| a.url.cmp(&b.url));
        entries
    }

    pub fn dead_letters(&self) -> &[DeadLetterEntry] {
        &self.dead_letters
    }

    /// Last sequence number covered by this state
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn snapshot_sequence(&self) -> Option<u64> {
        self.snapshot_sequence
    }

    pub fn config_hash(&self) -> Option<&str> {
        self.config_hash.as_deref()
    }

    /// WAL records applied on top of the snapshot
    pub fn replayed(&self) -> usize {
        self.replayed
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }
}

/// What a restore found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub snapshot_sequence: Option<u64>,
    pub replayed: usize,
    pub frontier: usize,
    pub requeued_in_flight: usize,
    pub retry: usize,
    pub seen: usize,
    pub dead_letters: usize,
    pub config_changed: bool,
}

impl RestoreReport {
    /// Whether anything was found on disk
    pub fn is_empty(&self) -> bool {
        self.snapshot_sequence.is_none() && self.replayed == 0
    }
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frontier ({} requeued from in-flight), {} retry, {} seen, {} dead letters; {} WAL record(s) replayed",
            self.frontier,
            self.requeued_in_flight,
            self.retry,
            self.seen,
            self.dead_letters,
            self.replayed
        )
    }
}

/// Restores the run state on startup and writes checkpoints afterwards
pub struct StateBootstrapper {
    state: Arc<RunState>,
    journal: Option<Journal>,
}

impl StateBootstrapper {
    pub fn new(state: Arc<RunState>, journal: Journal) -> Self {
        Self {
            state,
            journal: Some(journal),
        }
    }

    /// Opens the journal under `data-dir`
    ///
    /// With `fresh`, any persisted state is deleted first.
    pub fn open(
        state: Arc<RunState>,
        config: &DurabilityConfig,
        config_hash: Option<String>,
        fresh: bool,
    ) -> StorageResult<Self> {
        if fresh {
            discard_persisted_state(config)?;
        }
        let journal = Journal::open(config, config_hash)?;
        Ok(Self::new(state, journal))
    }

    /// Rebuilds persisted state without taking ownership of the files
    ///
    /// Used for read-only inspection; nothing is requeued or rewritten.
    pub fn inspect(config: &DurabilityConfig) -> StorageResult<RecoveredState> {
        let snapshot = snapshot_repository(config)?.load()?;
        let records: Vec<WalRecord> = read_log(&wal_path(config), &JsonCodec)?;
        Ok(RecoveredState::rebuild(snapshot, records))
    }

    /// Loads the snapshot, replays the WAL, requeues in-flight tasks,
    /// installs the result and attaches the journal to the run state
    ///
    /// A checkpoint is written at the end so the requeue itself is durable.
    ///
    /// # Returns
    ///
    /// * `Ok(RestoreReport)` - Counts of what was loaded, replayed and requeued
    /// * `Err(StorageError)` - The snapshot or WAL could not be read, or the
    ///   closing checkpoint failed
    pub fn restore(&mut self) -> StorageResult<RestoreReport> {
        let mut journal = self.journal.take().ok_or(StorageError::AlreadyRestored)?;
        let mut recovered = journal.recover()?;

        let config_changed = match (recovered.config_hash(), journal.config_hash()) {
            (Some(previous), Some(current)) => previous != current,
            _ => false,
        };
        if config_changed {
            tracing::warn!("Configuration changed since the last checkpoint; resuming anyway");
        }

        let requeued_in_flight = recovered.requeue_in_flight();
        let report = RestoreReport {
            snapshot_sequence: recovered.snapshot_sequence(),
            replayed: recovered.replayed(),
            frontier: recovered.frontier.len(),
            requeued_in_flight,
            retry: recovered.retry.len(),
            seen: recovered.seen.len(),
            dead_letters: recovered.dead_letters.len(),
            config_changed,
        };

        journal.resume_after(recovered.sequence());
        self.state.install(&recovered);
        self.state.attach_journal(journal);
        self.state.checkpoint()?;

        if report.is_empty() {
            tracing::info!("No persisted state found, starting fresh");
        } else {
            tracing::info!("Restored state: {}", report);
        }
        Ok(report)
    }

    /// Takes a full snapshot and rotates the WAL
    pub fn checkpoint(&self) -> StorageResult<()> {
        self.state.checkpoint()
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }
}

fn discard_persisted_state(config: &DurabilityConfig) -> StorageResult<()> {
    tracing::info!("Discarding persisted state in {}", config.data_dir.display());
    snapshot_repository(config)?.clear()?;
    let wal = wal_path(config);
    for path in [wal.clone(), crate::storage::wal::rotated_path(&wal)] {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
