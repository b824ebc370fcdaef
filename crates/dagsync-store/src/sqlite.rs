//! SQLite implementation of the Store trait.
//!
//! The persistent backend. Uses rusqlite with bundled SQLite; every call runs
//! on the blocking pool via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use dagsync_core::{canonical_bytes, decode_msg_value, now_millis, AuthorId, Msg, MsgKey, MsgValue, Range};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{FeedSummary, InsertResult, Store};

/// SQLite-based store.
///
/// Thread-safe via an internal Mutex around a single connection.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database at `path` and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
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
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

/// Raw columns of one `msgs` row.
struct RawMsg {
    key: Vec<u8>,
    canonical: Vec<u8>,
    received_at: i64,
}

const MSG_COLUMNS: &str = "key, canonical_bytes, received_at";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMsg> {
    Ok(RawMsg {
        key: row.get(0)?,
        canonical: row.get(1)?,
        received_at: row.get(2)?,
    })
}

fn decode_row(row: RawMsg) -> Result<Msg> {
    let key = MsgKey::try_from(row.key.as_slice())
        .map_err(|_| StoreError::InvalidData(format!("key of {} bytes", row.key.len())))?;
    let value =
        decode_msg_value(&row.canonical).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(Msg {
        key,
        value,
        received_at: row.received_at,
    })
}

fn query_msgs(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Msg>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, read_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(decode_row).collect()
}

/// SQLite integers are signed; sequences above `i64::MAX` are clamped.
fn seq_param(seq: u64) -> i64 {
    seq.min(i64::MAX as u64) as i64
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_msg(&self, value: &MsgValue) -> Result<InsertResult> {
        let value = value.clone();
        self.blocking(move |conn| {
            let key = value.key();
            let tx = conn.transaction()?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM msgs WHERE key = ?1",
                    params![key.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Ok(InsertResult::AlreadyExists);
            }

            let at_position: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT key FROM msgs WHERE author = ?1 AND sequence = ?2",
                    params![value.author.as_bytes().as_slice(), seq_param(value.sequence)],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = at_position {
                let existing = MsgKey::try_from(existing.as_slice())
                    .map_err(|_| StoreError::InvalidData("stored key length".into()))?;
                return Ok(InsertResult::Conflict { existing });
            }

            tx.execute(
                "INSERT INTO msgs (key, author, sequence, timestamp, root, canonical_bytes, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    key.as_bytes().as_slice(),
                    value.author.as_bytes().as_slice(),
                    seq_param(value.sequence),
                    value.timestamp,
                    value.content.root.map(|r| r.0.to_vec()),
                    canonical_bytes(&value),
                    now_millis(),
                ],
            )?;
            tx.commit()?;
            Ok(InsertResult::Inserted(key))
        })
        .await
    }

    async fn get_msg(&self, key: &MsgKey) -> Result<Option<Msg>> {
        let key = *key;
        self.blocking(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM msgs WHERE key = ?1", MSG_COLUMNS),
                    params![key.as_bytes().as_slice()],
                    read_row,
                )
                .optional()?;
            row.map(decode_row).transpose()
        })
        .await
    }

    async fn delete_msg(&self, key: &MsgKey) -> Result<bool> {
        let key = *key;
        self.blocking(move |conn| {
            let n = conn.execute(
                "DELETE FROM msgs WHERE key = ?1",
                params![key.as_bytes().as_slice()],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn feed_msgs(&self, author: &AuthorId, range: Range) -> Result<Vec<Msg>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let author = *author;
        self.blocking(move |conn| {
            query_msgs(
                conn,
                &format!(
                    "SELECT {} FROM msgs WHERE author = ?1 AND sequence BETWEEN ?2 AND ?3 ORDER BY sequence",
                    MSG_COLUMNS
                ),
                params![
                    author.as_bytes().as_slice(),
                    seq_param(range.min),
                    seq_param(range.max)
                ],
            )
        })
        .await
    }

    async fn feed_summary(&self, author: &AuthorId) -> Result<Option<FeedSummary>> {
        let author = *author;
        self.blocking(move |conn| {
            let (min, max, count): (Option<i64>, Option<i64>, i64) = conn.query_row(
                "SELECT MIN(sequence), MAX(sequence), COUNT(*) FROM msgs WHERE author = ?1",
                params![author.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            let (Some(min), Some(max)) = (min, max) else {
                return Ok(None);
            };
            let latest: Vec<u8> = conn.query_row(
                "SELECT key FROM msgs WHERE author = ?1 AND sequence = ?2",
                params![author.as_bytes().as_slice(), max],
                |row| row.get(0),
            )?;
            let latest = MsgKey::try_from(latest.as_slice())
                .map_err(|_| StoreError::InvalidData("stored key length".into()))?;
            Ok(Some(FeedSummary {
                min_sequence: min as u64,
                max_sequence: max as u64,
                count: count as u64,
                latest,
            }))
        })
        .await
    }

    async fn delete_feed(&self, author: &AuthorId) -> Result<usize> {
        let author = *author;
        self.blocking(move |conn| {
            Ok(conn.execute(
                "DELETE FROM msgs WHERE author = ?1",
                params![author.as_bytes().as_slice()],
            )?)
        })
        .await
    }

    async fn thread_msgs(&self, root: &MsgKey) -> Result<Vec<Msg>> {
        let root = *root;
        self.blocking(move |conn| {
            query_msgs(
                conn,
                &format!("SELECT {} FROM msgs WHERE root = ?1 ORDER BY id", MSG_COLUMNS),
                params![root.as_bytes().as_slice()],
            )
        })
        .await
    }

    async fn all_msgs(&self) -> Result<Vec<Msg>> {
        self.blocking(|conn| {
            query_msgs(
                conn,
                &format!("SELECT {} FROM msgs ORDER BY id", MSG_COLUMNS),
                [],
            )
        })
        .await
    }

    async fn msg_count(&self) -> Result<usize> {
        self.blocking(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM msgs", [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }
}
