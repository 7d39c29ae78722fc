//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the outbox. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use outbox_core::{
    now_millis, validate_operation, NewOperation, OperationKey, Parameters, PendingOperation,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::Store;

/// How long a connection waits on a database locked by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist. Opening an
    /// existing database leaves its contents untouched.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

// Helper to convert a row to PendingOperation
fn row_to_operation(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingOperation> {
    let parameters_cbor: Vec<u8> = row.get("parameters")?;
    let parameters = decode_parameters(&parameters_cbor).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Blob,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;

    Ok(PendingOperation {
        key: OperationKey::new(row.get("key")?),
        endpoint: row.get("endpoint")?,
        parameters,
        created_at: row.get("created_at")?,
        tries: row.get("tries")?,
    })
}

// Helper to encode parameters to CBOR
fn encode_parameters(parameters: &Parameters) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(parameters, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_parameters(bytes: &[u8]) -> std::result::Result<Parameters, String> {
    if bytes.is_empty() {
        return Ok(Parameters::new());
    }
    ciborium::from_reader(bytes).map_err(|e| e.to_string())
}

#[async_trait]
impl Store for SqliteStore {
    async fn add(&self, op: &NewOperation) -> Result<OperationKey> {
        validate_operation(op)?;
        let parameters = encode_parameters(&op.parameters)?;
        let endpoint = op.endpoint.clone();
        let created_at = op.created_at;

        let key = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO outbox (endpoint, parameters, created_at, tries)
                     VALUES (?1, ?2, ?3, 0)",
                    params![endpoint, parameters, created_at],
                )?;
                let key = tx.last_insert_rowid();
                tx.commit()?;
                Ok(OperationKey::new(key))
            })
            .await?;

        tracing::debug!(%key, endpoint = %op.endpoint, "operation stored");
        Ok(key)
    }

    async fn delete(&self, key: OperationKey) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM outbox WHERE key = ?1", params![key.get()])?;
            Ok(())
        })
        .await
    }

    async fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn list_all(&self) -> Result<Vec<PendingOperation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key, endpoint, parameters, created_at, tries
                 FROM outbox ORDER BY key ASC",
            )?;
            let ops = stmt
                .query_map([], row_to_operation)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ops)
        })
        .await
    }

    async fn increment_tries(&self, key: OperationKey) -> Result<Option<u32>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE outbox SET tries = tries + 1 WHERE key = ?1",
                params![key.get()],
            )?;
            let tries: Option<u32> = tx
                .query_row(
                    "SELECT tries FROM outbox WHERE key = ?1",
                    params![key.get()],
                    |row| row.get(0),
                )
                .optional()?;
            tx.commit()?;
            Ok(tries)
        })
        .await
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_owned();
        self.with_conn(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM metadata WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_owned();
        let value = value.to_owned();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO metadata (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                params![key, value, now_millis()],
            )?;
            Ok(())
        })
        .await
    }
}
