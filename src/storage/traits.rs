//! Storage traits and error types
//!
//! This module defines the snapshot repository interface and the errors
//! raised by the durability layer.

use crate::storage::Snapshot;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Corrupt log {path} at line {line}: {reason}")]
    Corrupt {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("State already restored")]
    AlreadyRestored,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence backend for point-in-time snapshots
///
/// Implementations must make `save` atomic from the reader's perspective:
/// after a crash in the middle of a save, `load` returns either the previous
/// snapshot or the new one, never a partial write.
pub trait SnapshotRepository: Send {
    /// Loads the latest committed snapshot, if any
    fn load(&self) -> StorageResult<Option<Snapshot>>;

    /// Atomically replaces the committed snapshot
    fn save(&self, snapshot: &Snapshot) -> StorageResult<()>;

    /// Deletes the committed snapshot
    fn clear(&self) -> StorageResult<()>;
}
