pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the pointer cache database at the given path, with schema
/// initialized and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with schema and migrations applied.
pub fn open_memory_database() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Snapshot of database health for `doctor`.
#[derive(Debug)]
pub struct HealthReport {
    pub schema_version: u32,
    pub pointer_count: i64,
    /// Most recent `updated_at` in the cache, if any rows exist.
    pub last_write: Option<String>,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::get_schema_version(conn)?;
    let pointer_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM pointer_cache", [], |row| row.get(0))?;
    let last_write: Option<String> =
        conn.query_row("SELECT MAX(updated_at) FROM pointer_cache", [], |row| row.get(0))?;
    let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;

    Ok(HealthReport {
        schema_version,
        pointer_count,
        last_write,
        integrity_ok: integrity == "ok",
        integrity_details: integrity,
    })
}
