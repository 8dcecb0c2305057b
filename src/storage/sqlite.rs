//! SQLite snapshot backend

use crate::storage::schema::initialize_schema;
use crate::storage::{Codec, JsonCodec, Snapshot, SnapshotRepository, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Snapshot repository backed by a single-row SQLite table
pub struct SqliteSnapshotRepository<C = JsonCodec> {
    conn: Connection,
    codec: C,
}

impl SqliteSnapshotRepository<JsonCodec> {
    /// Opens (or creates) the snapshot database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSnapshotRepository)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
        ",
        )?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            codec: JsonCodec,
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            codec: JsonCodec,
        })
    }
}

impl<C: Codec> SnapshotRepository for SqliteSnapshotRepository<C> {
    fn load(&self) -> StorageResult<Option<Snapshot>> {
        let payload: Option<String> = self
            .conn
            .query_row("SELECT payload FROM snapshot WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match payload {
            Some(payload) => {
                let snapshot: Snapshot = self.codec.decode(&payload)?;
                snapshot.check_version()?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let payload = self.codec.encode(snapshot)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO snapshot (id, version, sequence, taken_at, config_hash, payload)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.version,
                snapshot.sequence as i64,
                snapshot.taken_at.to_rfc3339(),
                snapshot.config_hash,
                payload
            ],
        )?;
        tx.commit()?;
        tracing::debug!("Snapshot {} saved to SQLite", snapshot.sequence);
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM snapshot", [])?;
        Ok(())
    }
}
