//! SQLite-backed LockStore implementation.
//! Gives conditional-write coordination across processes sharing one
//! database file, and persistence across restarts.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! fenlock-core = { version = "0.1", features = ["sqlite"] }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;
use crate::infrastructure::{LockStore, ReleasePolicy};
use crate::types::LockRecord;

/// A persistent lock store backed by SQLite.
///
/// Uses WAL mode with a busy timeout so several client processes can share
/// the file. Each conditional operation is a single SQL statement, which is
/// what makes it atomic.
#[derive(Clone)]
pub struct SqliteLockStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLockStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;

        conn.pragma_update(None, "journal_mode", "WAL").map_err(db_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(db_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_err)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS locks (
                key               TEXT PRIMARY KEY,
                owner             TEXT NOT NULL,
                record_version    TEXT NOT NULL,
                lease_duration_ms INTEGER NOT NULL,
                data              BLOB,
                released          INTEGER NOT NULL DEFAULT 0,
                created_at_ms     INTEGER
            );",
        )
        .map_err(db_err)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs a blocking rusqlite call off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("sqlite connection poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("sqlite worker failed: {e}")))?
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<LockRecord> {
        Ok(LockRecord {
            key: row.get(0)?,
            owner: row.get(1)?,
            record_version: row.get(2)?,
            lease_duration_ms: row.get(3)?,
            data: row.get(4)?,
            released: row.get(5)?,
            created_at_ms: row.get(6)?,
        })
    }
}

#[async_trait]
impl LockStore for SqliteLockStore {
    async fn get_record(&self, key: &str) -> Result<Option<LockRecord>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT key, owner, record_version, lease_duration_ms, data, released, created_at_ms
                 FROM locks WHERE key = ?1",
                params![key],
                Self::row_to_record,
            )
            .optional()
            .map_err(db_err)
        })
        .await
    }

    async fn put_record_if_absent(&self, record: LockRecord) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO locks (key, owner, record_version, lease_duration_ms, data, released, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.key,
                    record.owner,
                    record.record_version,
                    record.lease_duration_ms,
                    record.data,
                    record.released,
                    record.created_at_ms,
                ],
            );
            match result {
                Ok(_) => Ok(()),
                // Primary-key collision: a record already exists
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::ConditionFailed)
                }
                Err(e) => Err(db_err(e)),
            }
        })
        .await
    }

    async fn put_record_if_version_matches(
        &self,
        expected_version: &str,
        record: LockRecord,
    ) -> Result<(), StoreError> {
        let expected = expected_version.to_string();
        self.with_conn(move |conn| {
            let rows = conn
                .execute(
                    "UPDATE locks
                     SET owner = ?1, record_version = ?2, lease_duration_ms = ?3,
                         data = ?4, released = ?5, created_at_ms = ?6
                     WHERE key = ?7 AND record_version = ?8",
                    params![
                        record.owner,
                        record.record_version,
                        record.lease_duration_ms,
                        record.data,
                        record.released,
                        record.created_at_ms,
                        record.key,
                        expected,
                    ],
                )
                .map_err(db_err)?;
            if rows > 0 {
                Ok(())
            } else {
                Err(StoreError::ConditionFailed)
            }
        })
        .await
    }

    async fn delete_or_mark_released_if_version_matches(
        &self,
        key: &str,
        expected_version: &str,
        policy: ReleasePolicy,
    ) -> Result<(), StoreError> {
        let key = key.to_string();
        let expected = expected_version.to_string();
        self.with_conn(move |conn| {
            let rows = match policy {
                ReleasePolicy::Delete => conn
                    .execute(
                        "DELETE FROM locks WHERE key = ?1 AND record_version = ?2",
                        params![key, expected],
                    )
                    .map_err(db_err)?,
                ReleasePolicy::MarkReleased => conn
                    .execute(
                        "UPDATE locks SET released = 1 WHERE key = ?1 AND record_version = ?2",
                        params![key, expected],
                    )
                    .map_err(db_err)?,
            };
            if rows > 0 {
                Ok(())
            } else {
                Err(StoreError::ConditionFailed)
            }
        })
        .await
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}
