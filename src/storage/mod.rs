//! Durability layer: write-ahead log, snapshots and recovery
//!
//! - `wal`: append-only record log with `Sync` / `Batched` / `Async` flushing
//! - `snapshot` / `sqlite`: atomically replaced point-in-time captures
//! - `policy`: when to checkpoint
//! - `journal`: sequenced state events plus checkpointing
//! - `bootstrap`: rebuild, requeue and install on startup
//!
//! All files live under the configured `data-dir`.

mod bootstrap;
mod codec;
mod journal;
mod policy;
mod schema;
mod snapshot;
mod sqlite;
mod traits;
mod wal;

pub use bootstrap::{RecoveredState, RestoreReport, StateBootstrapper, IN_FLIGHT_SOURCE};
pub use codec::{Codec, JsonCodec};
pub use journal::{Journal, StateEvent, WalRecord};
pub use policy::SnapshotPolicy;
pub use snapshot::{FileSnapshotRepository, Snapshot, SNAPSHOT_VERSION};
pub use sqlite::SqliteSnapshotRepository;
pub use traits::{SnapshotRepository, StorageError, StorageResult};
pub use wal::{read_log, rotated_path, Durability, WriteAheadLog};

use crate::config::{DurabilityConfig, SnapshotBackend};
use std::path::PathBuf;

/// File name of the write-ahead log inside `data-dir`
pub const WAL_FILE: &str = "journal.wal";

/// Location of the write-ahead log
pub fn wal_path(config: &DurabilityConfig) -> PathBuf {
    config.data_dir.join(WAL_FILE)
}

/// Opens the configured snapshot backend
pub fn snapshot_repository(
    config: &DurabilityConfig,
) -> StorageResult<Box<dyn SnapshotRepository>> {
    std::fs::create_dir_all(&config.data_dir)?;
    match config.backend {
        SnapshotBackend::File => Ok(Box::new(FileSnapshotRepository::new(
            config.data_dir.join("snapshot.json"),
        ))),
        SnapshotBackend::Sqlite => Ok(Box::new(SqliteSnapshotRepository::new(
            &config.data_dir.join("snapshot.db"),
        )?)),
    }
}
