//! Local `identity → pointer` cache.
//!
//! Read once when an identity connects, written after every successful
//! commit. Identities are stored lowercased so `0xAB…` and `0xab…` share a
//! row.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// One cached row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPointer {
    pub identity: String,
    pub pointer: String,
    pub updated_at: String,
}

fn key(identity: &str) -> String {
    identity.trim().to_lowercase()
}

pub fn lookup_pointer(conn: &Connection, identity: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT pointer FROM pointer_cache WHERE identity = ?1",
        [key(identity)],
        |row| row.get(0),
    )
    .optional()
}

pub fn store_pointer(conn: &Connection, identity: &str, pointer: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO pointer_cache (identity, pointer, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(identity) DO UPDATE SET pointer = excluded.pointer, updated_at = excluded.updated_at",
        params![key(identity), pointer, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Returns whether a row was removed.
pub fn remove_pointer(conn: &Connection, identity: &str) -> rusqlite::Result<bool> {
    let n = conn.execute("DELETE FROM pointer_cache WHERE identity = ?1", [key(identity)])?;
    Ok(n > 0)
}

/// All rows, most recently written first.
pub fn list_pointers(conn: &Connection) -> rusqlite::Result<Vec<CachedPointer>> {
    let mut stmt = conn.prepare(
        "SELECT identity, pointer, updated_at FROM pointer_cache ORDER BY updated_at DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(CachedPointer {
            identity: row.get(0)?,
            pointer: row.get(1)?,
            updated_at: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Async handle over the shared connection. SQLite calls run on the blocking pool.
#[derive(Clone)]
pub struct PointerCache {
    db: Arc<Mutex<Connection>>,
}

impl PointerCache {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub async fn lookup(&self, identity: &str) -> Result<Option<String>> {
        let identity = identity.to_string();
        self.with_conn(move |conn| lookup_pointer(conn, &identity)).await
    }

    pub async fn store(&self, identity: &str, pointer: &str) -> Result<()> {
        let identity = identity.to_string();
        let pointer = pointer.to_string();
        self.with_conn(move |conn| store_pointer(conn, &identity, &pointer)).await
    }

    pub async fn remove(&self, identity: &str) -> Result<bool> {
        let identity = identity.to_string();
        self.with_conn(move |conn| remove_pointer(conn, &identity)).await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            f(&*conn).map_err(anyhow::Error::from)
        })
        .await
        .map_err(|e| anyhow::anyhow!("pointer cache task failed: {e}"))?
    }
}
