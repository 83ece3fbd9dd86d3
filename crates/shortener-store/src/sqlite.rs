// ABOUTME: Transactional storage backend on SQLite, with dedup enforced by a partial unique index.
// ABOUTME: Batch inserts run in one transaction; blocking calls are moved off the async runtime.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use shortener_core::{
    BatchItem, FIRST_ID, Record, Storage, StoreError, StoreResult, validate_fields,
};
use thiserror::Error;

/// Errors that can occur during SQLite store operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<SqliteError> for StoreError {
    fn from(e: SqliteError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Deleted rows are excluded from the unique index, so a deleted record's
/// URL can be shortened again.
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS urls (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL CHECK (length(owner) <= 64),
        url TEXT NOT NULL CHECK (length(url) <= 2048),
        deleted INTEGER NOT NULL DEFAULT 0
    );

    CREATE UNIQUE INDEX IF NOT EXISTS urls_live_url ON urls (url) WHERE deleted = 0;

    CREATE INDEX IF NOT EXISTS urls_owner ON urls (owner);
";

const INSERT_URL: &str = "INSERT INTO urls (owner, url) VALUES (?1, ?2)";

/// SQLite-backed store. The connection is shared behind a mutex and only
/// touched from blocking worker threads.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a database file and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self, SqliteError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, SqliteError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SqliteError> {
        conn.execute_batch(SCHEMA)?;

        // AUTOINCREMENT continues from this sequence value, so the first
        // row of a fresh table gets FIRST_ID.
        conn.execute(
            "INSERT INTO sqlite_sequence (name, seq)
             SELECT 'urls', ?1
             WHERE NOT EXISTS (SELECT 1 FROM sqlite_sequence WHERE name = 'urls')",
            params![to_key(FIRST_ID - 1)],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, E, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                StoreError::BackendUnavailable("sqlite connection lock poisoned".to_string())
            })?;
            f(&mut *guard).map_err(Into::into)
        })
        .await
        .map_err(|e| StoreError::BackendUnavailable(format!("sqlite worker failed: {}", e)))?
    }
}

/// SQLite integer keys are signed; ids beyond i64::MAX cannot exist.
fn to_key(id: u64) -> Option<i64> {
    i64::try_from(id).ok()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    let id: i64 = row.get(0)?;
    Ok(Record {
        id: id as u64,
        owner: row.get(1)?,
        url: row.get(2)?,
        deleted: row.get(3)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn live_id_for(conn: &Connection, url: &str) -> Result<Option<u64>, SqliteError> {
    let id = conn
        .query_row(
            "SELECT id FROM urls WHERE url = ?1 AND deleted = 0",
            params![url],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(id.map(|id| id as u64))
}

/// Insert one row, translating a unique-index hit into `Conflict`.
fn insert_row(conn: &Connection, owner: &str, url: &str) -> StoreResult<u64> {
    validate_fields(owner, url)?;

    let inserted = conn
        .prepare_cached(INSERT_URL)
        .and_then(|mut stmt| stmt.execute(params![owner, url]));

    match inserted {
        Ok(_) => Ok(conn.last_insert_rowid() as u64),
        Err(e) if is_unique_violation(&e) => match live_id_for(conn, url)? {
            Some(existing) => Err(StoreError::Conflict(existing)),
            None => Err(SqliteError::from(e).into()),
        },
        Err(e) => Err(SqliteError::from(e).into()),
    }
}

#[async_trait]
impl Storage for SqliteStore {
    async fn get(&self, id: u64) -> StoreResult<Record> {
        let Some(key) = to_key(id) else {
            return Err(StoreError::NotFound);
        };

        let record = self
            .with_conn(move |conn: &mut Connection| -> Result<_, SqliteError> {
                Ok(conn
                    .query_row(
                        "SELECT id, owner, url, deleted FROM urls WHERE id = ?1",
                        params![key],
                        row_to_record,
                    )
                    .optional()?)
            })
            .await?;

        match record {
            None => Err(StoreError::NotFound),
            Some(record) if record.deleted => Err(StoreError::Gone(id)),
            Some(record) => Ok(record),
        }
    }

    async fn get_by_url(&self, url: &str) -> StoreResult<Record> {
        let url = url.to_string();
        self.with_conn(move |conn: &mut Connection| -> Result<_, SqliteError> {
            Ok(conn
                .query_row(
                    "SELECT id, owner, url, deleted FROM urls WHERE url = ?1 AND deleted = 0",
                    params![url],
                    row_to_record,
                )
                .optional()?)
        })
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn get_by_owner(&self, owner: &str) -> StoreResult<Vec<Record>> {
        let owner = owner.to_string();
        self.with_conn(move |conn: &mut Connection| -> Result<_, SqliteError> {
            let mut stmt = conn.prepare(
                "SELECT id, owner, url, deleted FROM urls
                 WHERE owner = ?1 AND deleted = 0 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![owner], row_to_record)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
    }

    async fn put(&self, owner: &str, url: &str) -> StoreResult<u64> {
        let owner = owner.to_string();
        let url = url.to_string();
        let id = self
            .with_conn(move |conn: &mut Connection| insert_row(conn, &owner, &url))
            .await?;
        tracing::debug!(id, "created record");
        Ok(id)
    }

    async fn put_batch(&self, items: Vec<BatchItem>) -> StoreResult<Vec<BatchItem>> {
        if items.is_empty() {
            return Ok(items);
        }

        let items = self
            .with_conn(move |conn: &mut Connection| -> StoreResult<Vec<BatchItem>> {
                let mut items = items;
                let tx = conn.transaction().map_err(SqliteError::from)?;

                // Returning early drops `tx`, which rolls the whole batch back.
                for (index, item) in items.iter_mut().enumerate() {
                    let id = insert_row(&tx, &item.owner, &item.url)
                        .map_err(|e| StoreError::abort_batch(index, &e))?;
                    item.id = Some(id);
                }

                tx.commit().map_err(SqliteError::from)?;
                Ok(items)
            })
            .await?;

        tracing::debug!(count = items.len(), "created record batch");
        Ok(items)
    }

    async fn delete_batch(&self, ids: &[u64]) -> StoreResult<()> {
        let keys: Vec<i64> = ids.iter().filter_map(|id| to_key(*id)).collect();
        if keys.is_empty() {
            return Ok(());
        }

        self.with_conn(move |conn: &mut Connection| -> Result<_, SqliteError> {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("UPDATE urls SET deleted = 1 WHERE id = ?1 AND deleted = 0")?;
                for key in &keys {
                    stmt.execute(params![key])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.with_conn(|conn: &mut Connection| -> Result<_, SqliteError> {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            StoreError::BackendUnavailable(msg) => StoreError::BackendUnavailable(msg),
            other => StoreError::BackendUnavailable(other.to_string()),
        })
    }
}
