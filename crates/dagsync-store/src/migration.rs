//! Database schema migrations for SQLite.
//!
//! Versioned migrations: each version transforms the schema from N-1 to N and
//! is recorded in `schema_migrations`.

use rusqlite::Connection;

use dagsync_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Safe to call repeatedly.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;
        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }
        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// v1: message log with feed and thread indexes.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE msgs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
            key BLOB NOT NULL UNIQUE,              -- 32 bytes, content address
            author BLOB NOT NULL,                  -- 32 bytes, Ed25519 public key
            sequence INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,            -- author-claimed (Unix ms)
            root BLOB,                             -- thread root, NULL unless a reply
            canonical_bytes BLOB NOT NULL,
            received_at INTEGER NOT NULL,          -- local receive time (Unix ms)

            UNIQUE(author, sequence)
        );

        CREATE INDEX idx_msgs_root ON msgs(root) WHERE root IS NOT NULL;
        "#,
    )?;
    Ok(())
}
