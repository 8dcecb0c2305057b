//! Sequenced state-change log plus checkpointing
//!
//! Every compound mutation of the run state is recorded as one
//! [`StateEvent`], wrapped in a [`WalRecord`] with a monotonically increasing
//! sequence number. A snapshot remembers the last sequence it includes, so
//! replay can skip anything already captured even if the process died
//! between saving a snapshot and rotating the log.

use crate::config::DurabilityConfig;
use crate::frontier::{DeadLetterEntry, RetryRecord};
use crate::storage::bootstrap::RecoveredState;
use crate::storage::{
    snapshot_repository, wal_path, Durability, Snapshot, SnapshotPolicy, SnapshotRepository,
    StorageResult, WriteAheadLog,
};
use crate::task::{ProcessingTask, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One state transition of the scheduling structures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// Task accepted by the frontier
    Offered { task: ProcessingTask },

    /// Task moved from the frontier to the in-flight buffer
    CheckedOut { id: TaskId },

    /// In-flight task finished (completed or discarded)
    Released { id: TaskId },

    /// In-flight task moved to the retry buffer
    Deferred { record: RetryRecord },

    /// In-flight task moved to the dead-letter queue
    DeadLettered { entry: DeadLetterEntry },

    /// Retry records moved back to the frontier; refused ones rescheduled
    Promoted {
        ids: Vec<TaskId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rescheduled: Vec<RetryRecord>,
    },

    /// URL recorded as discovered
    Discovered { url: String },

    /// URL recorded as processed
    Processed { url: String },
}

/// A journaled event as stored in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: StateEvent,
}

/// Write side of the durability layer
pub struct Journal {
    wal: WriteAheadLog,
    snapshots: Box<dyn SnapshotRepository>,
    policy: SnapshotPolicy,
    operations_since_snapshot: u64,
    last_snapshot_at: DateTime<Utc>,
    next_sequence: u64,
    config_hash: Option<String>,
}

impl Journal {
    pub fn new(
        wal: WriteAheadLog,
        snapshots: Box<dyn SnapshotRepository>,
        policy: SnapshotPolicy,
    ) -> Self {
        Self {
            wal,
            snapshots,
            policy,
            operations_since_snapshot: 0,
            last_snapshot_at: Utc::now(),
            next_sequence: 1,
            config_hash: None,
        }
    }

    /// Opens the WAL and snapshot backend under `data-dir`
    pub fn open(config: &DurabilityConfig, config_hash: Option<String>) -> StorageResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let wal = WriteAheadLog::open(wal_path(config), Durability::from_config(config))?;
        let snapshots = snapshot_repository(config)?;
        Ok(Self::new(wal, snapshots, SnapshotPolicy::from_config(config))
            .with_config_hash(config_hash))
    }

    pub fn with_config_hash(mut self, config_hash: Option<String>) -> Self {
        self.config_hash = config_hash;
        self
    }

    /// Appends an event; returns its sequence number
    pub fn record(&mut self, event: StateEvent, at: DateTime<Utc>) -> StorageResult<u64> {
        let seq = self.next_sequence;
        self.wal.append(&WalRecord { seq, at, event })?;
        self.next_sequence += 1;
        self.operations_since_snapshot += 1;
        Ok(seq)
    }

    /// Checks the snapshot policy
    pub fn checkpoint_due(&self, now: DateTime<Utc>) -> bool {
        self.policy
            .should_snapshot(self.operations_since_snapshot, now, self.last_snapshot_at)
    }

    /// Saves a snapshot and rotates the WAL
    ///
    /// The snapshot must have been captured with [`last_sequence`](Self::last_sequence)
    /// while holding the same critical section.
    pub fn commit_snapshot(&mut self, snapshot: &Snapshot) -> StorageResult<()> {
        self.snapshots.save(snapshot)?;
        self.wal.rotate()?;
        self.operations_since_snapshot = 0;
        self.last_snapshot_at = snapshot.taken_at;
        tracing::info!(
            "Checkpoint at sequence {} ({} frontier, {} in flight, {} retry, {} seen, {} dead)",
            snapshot.sequence,
            snapshot.frontier.len(),
            snapshot.in_flight.len(),
            snapshot.retry.len(),
            snapshot.seen.len(),
            snapshot.dead_letters.len()
        );
        Ok(())
    }

    /// Loads the committed snapshot and replays the WAL on top of it
    pub fn recover(&mut self) -> StorageResult<RecoveredState> {
        let snapshot = self.snapshots.load()?;
        let records: Vec<WalRecord> = self.wal.read_all()?;
        Ok(RecoveredState::rebuild(snapshot, records))
    }

    /// Continues numbering after a recovered sequence
    pub(crate) fn resume_after(&mut self, sequence: u64) {
        self.next_sequence = self.next_sequence.max(sequence + 1);
    }

    /// Sequence of the last recorded event, 0 if none
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    pub fn config_hash(&self) -> Option<&str> {
        self.config_hash.as_deref()
    }

    pub fn operations_since_snapshot(&self) -> u64 {
        self.operations_since_snapshot
    }

    pub fn flush(&mut self) -> StorageResult<()> {
        self.wal.flush()
    }

    pub fn flush_if_due(&mut self) -> StorageResult<()> {
        self.wal.flush_if_due()
    }

    pub fn wal(&self) -> &WriteAheadLog {
        &self.wal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileSnapshotRepository;
    use tempfile::TempDir;
    use url::Url;

    fn journal(dir: &TempDir, policy: SnapshotPolicy) -> Journal {
        let wal = WriteAheadLog::open(dir.path().join("journal.wal"), Durability::Sync).unwrap();
        let snapshots = FileSnapshotRepository::new(dir.path().join("snapshot.json"));
        Journal::new(wal, Box::new(snapshots), policy)
    }

    fn task() -> ProcessingTask {
        let url = Url::parse("https://example.com/").unwrap();
        ProcessingTask::seed(url, "test", 0, Utc::now())
    }

    #[test]
    fn test_sequences_increase() {
        let dir = TempDir::new().unwrap();
        let mut journal = journal(&dir, SnapshotPolicy::Never);
        assert_eq!(journal.last_sequence(), 0);

        let first = journal
            .record(StateEvent::Offered { task: task() }, Utc::now())
            .unwrap();
        let second = journal
            .record(
                StateEvent::Discovered {
                    url: "https://example.com/".to_string(),
                },
                Utc::now(),
            )
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(journal.last_sequence(), 2);
        assert_eq!(journal.operations_since_snapshot(), 2);
    }

    #[test]
    fn test_checkpoint_due_follows_policy() {
        let dir = TempDir::new().unwrap();
        let mut journal = journal(&dir, SnapshotPolicy::EveryOperations(2));
        journal
            .record(StateEvent::Offered { task: task() }, Utc::now())
            .unwrap();
        assert!(!journal.checkpoint_due(Utc::now()));

        journal
            .record(StateEvent::Offered { task: task() }, Utc::now())
            .unwrap();
        assert!(journal.checkpoint_due(Utc::now()));

        let snapshot = Snapshot::empty(journal.last_sequence(), Utc::now());
        journal.commit_snapshot(&snapshot).unwrap();
        assert!(!journal.checkpoint_due(Utc::now()));
        assert_eq!(journal.operations_since_snapshot(), 0);
    }

    #[test]
    fn test_event_encoding_is_tagged() {
        let event = StateEvent::Processed {
            url: "https://example.com/".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "processed");
    }
}
