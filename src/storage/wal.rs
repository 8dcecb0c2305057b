//! Append-only write-ahead log
//!
//! One record per line: `<checksum>\t<encoded record>`, where the checksum
//! is the first 16 hex characters of the SHA-256 of the encoded record.
//! A torn final line (crash mid-append) is dropped on read; a damaged line
//! anywhere else is reported as corruption.

use crate::config::{DurabilityConfig, DurabilityMode};
use crate::storage::{Codec, JsonCodec, StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const CHECKSUM_LEN: usize = 16;

/// When appended records are forced to stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// Flush on every append
    Sync,

    /// Flush once `max_records` are pending or the oldest pending record is
    /// older than `max_delay`
    Batched {
        max_records: usize,
        max_delay: Duration,
    },

    /// Flush opportunistically once `flush_interval` has elapsed since the
    /// last flush
    Async { flush_interval: Duration },
}

impl Durability {
    pub fn from_config(config: &DurabilityConfig) -> Self {
        match config.mode {
            DurabilityMode::Sync => Self::Sync,
            DurabilityMode::Batched => Self::Batched {
                max_records: config.max_records,
                max_delay: Duration::from_millis(config.max_delay_ms),
            },
            DurabilityMode::Async => Self::Async {
                flush_interval: Duration::from_millis(config.flush_interval_ms),
            },
        }
    }
}

/// Append-only event log with a configurable flush policy
///
/// Callers serialize access (`&mut self`); the journal keeps the log behind
/// the run state's single-writer lock.
pub struct WriteAheadLog<C = JsonCodec> {
    path: PathBuf,
    writer: BufWriter<File>,
    codec: C,
    durability: Durability,
    pending: usize,
    oldest_pending_at: Option<Instant>,
    last_flush_at: Instant,
    flush_count: u64,
}

impl WriteAheadLog<JsonCodec> {
    /// Opens (or creates) a JSON-encoded log
    pub fn open(path: impl Into<PathBuf>, durability: Durability) -> StorageResult<Self> {
        Self::with_codec(path, durability, JsonCodec)
    }
}

impl<C: Codec> WriteAheadLog<C> {
    /// Opens (or creates) a log using the given codec
    ///
    /// An incomplete final line left by a crash is cut off so new records
    /// start on a fresh line.
    pub fn with_codec(
        path: impl Into<PathBuf>,
        durability: Durability,
        codec: C,
    ) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        truncate_torn_tail(&path)?;
        let writer = BufWriter::new(open_append(&path)?);

        Ok(Self {
            path,
            writer,
            codec,
            durability,
            pending: 0,
            oldest_pending_at: None,
            last_flush_at: Instant::now(),
            flush_count: 0,
        })
    }

    /// Encodes and appends a record, then applies the durability policy
    ///
    /// # Arguments
    ///
    /// * `record` - Any serializable record; it is stored as one checksummed line
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The record is accepted; it reaches disk per the durability policy
    /// * `Err(StorageError)` - Encoding or writing failed
    pub fn append<T: Serialize>(&mut self, record: &T) -> StorageResult<()> {
        let encoded = self.codec.encode(record)?;
        writeln!(self.writer, "{}\t{}", checksum(&encoded), encoded)?;
        self.pending += 1;
        self.oldest_pending_at.get_or_insert_with(Instant::now);

        match self.durability {
            Durability::Sync => self.flush(),
            Durability::Batched { max_records, .. } if self.pending >= max_records => self.flush(),
            _ => self.flush_if_due(),
        }
    }

    /// Flushes pending records if a time threshold has passed
    ///
    /// Called after every append and periodically by the durability ticker,
    /// so buffered records never wait unboundedly.
    pub fn flush_if_due(&mut self) -> StorageResult<()> {
        if self.pending == 0 {
            return Ok(());
        }
        let due = match self.durability {
            Durability::Sync => true,
            Durability::Batched { max_delay, .. } => self
                .oldest_pending_at
                .map(|at| at.elapsed() >= max_delay)
                .unwrap_or(false),
            Durability::Async { flush_interval } => {
                self.last_flush_at.elapsed() >= flush_interval
            }
        };
        if due {
            self.flush()?;
        }
        Ok(())
    }

    /// Forces pending records to stable storage
    pub fn flush(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        if self.pending > 0 {
            self.flush_count += 1;
            tracing::trace!("WAL flushed {} record(s)", self.pending);
        }
        self.pending = 0;
        self.oldest_pending_at = None;
        self.last_flush_at = Instant::now();
        Ok(())
    }

    /// Returns every record in append order
    ///
    /// Pending records are flushed first so the file is complete.
    pub fn read_all<T: DeserializeOwned>(&mut self) -> StorageResult<Vec<T>> {
        self.flush()?;
        read_log(&self.path, &self.codec)
    }

    /// Moves the active log aside to `<path>.old` and starts an empty one
    ///
    /// Called right after a successful snapshot.
    pub fn rotate(&mut self) -> StorageResult<()> {
        self.flush()?;
        let old = rotated_path(&self.path);
        if fs::rename(&self.path, &old).is_err() {
            // Some platforms refuse to rename over an existing file
            if old.exists() {
                fs::remove_file(&old)?;
            }
            fs::rename(&self.path, &old)?;
        }
        self.writer = BufWriter::new(open_append(&self.path)?);
        tracing::debug!("WAL rotated to {}", old.display());
        Ok(())
    }

    /// Number of flushes that wrote at least one record
    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    /// Records appended but not yet flushed
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads a log file without opening it for writing
///
/// A missing file is an empty log.
pub fn read_log<T: DeserializeOwned, C: Codec>(path: &Path, codec: &C) -> StorageResult<Vec<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let complete = content.ends_with('\n');
    let lines: Vec<&str> = content.lines().collect();
    let mut records = Vec::with_capacity(lines.len());

    for (index, line) in lines.iter().enumerate() {
        let is_last = index + 1 == lines.len();
        if is_last && !complete {
            tracing::warn!(
                "Dropping torn record at end of {} (line {})",
                path.display(),
                index + 1
            );
            break;
        }

        match decode_line(line, codec) {
            Ok(record) => records.push(record),
            Err(reason) if is_last => {
                tracing::warn!(
                    "Dropping damaged final record of {} (line {}): {}",
                    path.display(),
                    index + 1,
                    reason
                );
            }
            Err(reason) => {
                return Err(StorageError::Corrupt {
                    path: path.display().to_string(),
                    line: index + 1,
                    reason,
                })
            }
        }
    }

    Ok(records)
}

/// Path a rotated log is moved to
pub fn rotated_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".old");
    PathBuf::from(name)
}

fn decode_line<T: DeserializeOwned, C: Codec>(line: &str, codec: &C) -> Result<T, String> {
    let (sum, encoded) = line
        .split_once('\t')
        .ok_or_else(|| "missing checksum separator".to_string())?;
    if sum != checksum(encoded) {
        return Err("checksum mismatch".to_string());
    }
    codec.decode(encoded).map_err(|e| e.to_string())
}

fn checksum(encoded: &str) -> String {
    let digest = Sha256::digest(encoded.as_bytes());
    let mut sum = hex::encode(digest);
    sum.truncate(CHECKSUM_LEN);
    sum
}

fn open_append(path: &Path) -> StorageResult<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn truncate_torn_tail(path: &Path) -> StorageResult<()> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }

    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|pos| pos + 1)
        .unwrap_or(0);
    tracing::warn!(
        "Truncating torn tail of {} ({} byte(s))",
        path.display(),
        bytes.len() - keep
    );
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(keep as u64)?;
    file.sync_all()?;
    Ok(())
}
