//! Durable store adapter.
//!
//! The host provides a small key/value capability that survives process
//! restarts. The pending queue is serialized under a single key.

use crate::{OutboxError, OutboxResult};
use fault_record::FaultRecord;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Key holding the serialized pending queue.
pub const PERSIST_KEY: &str = "__fault_tracker_queue_v5__";

/// Trait for host persistence backends.
pub trait DurableStore: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> OutboxResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> OutboxResult<Option<String>>;

    /// Delete a value, returning whether it existed
    fn delete(&self, key: &str) -> OutboxResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> OutboxResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Process-local store. Useful for tests and hosts without persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> OutboxResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> OutboxResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> OutboxResult<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

/// SQLite-backed key/value store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a store at the given path, creating the table if needed.
    pub fn open(path: &Path) -> OutboxResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutboxError::Store(format!("create {}: {}", parent.display(), e)))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
        ",
        )?;
        Self::with_connection(conn)
    }

    /// Open an in-memory store for testing.
    pub fn open_in_memory() -> OutboxResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> OutboxResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );
        ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl DurableStore for SqliteStore {
    fn set(&self, key: &str, value: &str) -> OutboxResult<()> {
        self.conn.lock().execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> OutboxResult<Option<String>> {
        let value = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn delete(&self, key: &str) -> OutboxResult<bool> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }
}

/// Serializes the pending queue into a [`DurableStore`].
///
/// Without a backend every operation is a no-op and the queue is memory-only.
#[derive(Clone, Default)]
pub struct QueueStore {
    backend: Option<Arc<dyn DurableStore>>,
}

impl QueueStore {
    pub fn new(backend: Option<Arc<dyn DurableStore>>) -> Self {
        Self { backend }
    }

    /// A store that persists nothing.
    pub fn memory_only() -> Self {
        Self { backend: None }
    }

    pub fn is_durable(&self) -> bool {
        self.backend.is_some()
    }

    /// Read the persisted queue.
    ///
    /// Absent, unreadable or corrupt state yields an empty list.
    pub fn load(&self) -> Vec<FaultRecord> {
        let Some(backend) = &self.backend else {
            return Vec::new();
        };

        let raw = match backend.get(PERSIST_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted queue");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<FaultRecord>>(&raw) {
            Ok(records) => {
                debug!(count = records.len(), "Loaded persisted queue");
                records
            }
            Err(e) => {
                warn!(error = %e, "Discarding corrupt persisted queue");
                Vec::new()
            }
        }
    }

    /// Write the full queue.
    pub fn persist<'a>(
        &self,
        records: impl IntoIterator<Item = &'a FaultRecord>,
    ) -> OutboxResult<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        let records: Vec<&FaultRecord> = records.into_iter().collect();
        let raw = serde_json::to_string(&records)?;
        backend.set(PERSIST_KEY, &raw)
    }

    /// Remove the persisted copy.
    pub fn clear(&self) -> OutboxResult<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        backend.delete(PERSIST_KEY)?;
        Ok(())
    }
}
