//! Point-in-time captures of the run state

use crate::frontier::{DeadLetterEntry, RetryRecord};
use crate::state::SeenEntry;
use crate::storage::{Codec, JsonCodec, SnapshotRepository, StorageError, StorageResult};
use crate::task::ProcessingTask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Complete capture of the scheduling structures
///
/// `sequence` is the last WAL sequence number included; replay skips every
/// record at or below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    pub frontier: Vec<ProcessingTask>,
    pub in_flight: Vec<ProcessingTask>,
    pub retry: Vec<RetryRecord>,
    pub seen: Vec<SeenEntry>,
    pub dead_letters: Vec<DeadLetterEntry>,
}

impl Snapshot {
    /// Creates an empty snapshot
    pub fn empty(sequence: u64, taken_at: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            sequence,
            taken_at,
            config_hash: None,
            frontier: Vec::new(),
            in_flight: Vec::new(),
            retry: Vec::new(),
            seen: Vec::new(),
            dead_letters: Vec::new(),
        }
    }

    pub(crate) fn check_version(&self) -> StorageResult<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }
}

/// Stores the snapshot as a single file, replaced atomically
///
/// `save` writes `<path>.tmp`, syncs it, then renames it over `<path>`.
pub struct FileSnapshotRepository<C = JsonCodec> {
    path: PathBuf,
    codec: C,
}

impl FileSnapshotRepository<JsonCodec> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_codec(path, JsonCodec)
    }
}

impl<C: Codec> FileSnapshotRepository<C> {
    pub fn with_codec(path: impl Into<PathBuf>, codec: C) -> Self {
        Self {
            path: path.into(),
            codec,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

/// Flushes the directory entry of `path` so a completed rename survives a crash
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> StorageResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()?;
    Ok(())
}

// Directories cannot be opened for syncing here
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> StorageResult<()> {
    Ok(())
}

impl<C: Codec> SnapshotRepository for FileSnapshotRepository<C> {
    fn load(&self) -> StorageResult<Option<Snapshot>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = self.codec.decode(&text)?;
        snapshot.check_version()?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let encoded = self.codec.encode(snapshot)?;
        let temp = self.temp_path();
        {
            let mut file = File::create(&temp)?;
            file.write_all(encoded.as_bytes())?;
            file.sync_all()?;
        }

        if fs::rename(&temp, &self.path).is_err() {
            // Fallback when the platform cannot rename over an existing file
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            fs::rename(&temp, &self.path)?;
        }
        sync_parent_dir(&self.path)?;

        tracing::debug!(
            "Snapshot {} saved to {}",
            snapshot.sequence,
            self.path.display()
        );
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        for path in [self.path.clone(), self.temp_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
