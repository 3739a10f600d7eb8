use rusqlite::{Connection, Result, Transaction};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Bumped whenever a derived table changes shape.
pub const SCHEMA_VERSION: i64 = 2;

/// The single store handle. Constructed once at startup and shared behind an
/// `Arc`; every method holds the connection lock for its whole duration.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        configure_pragmas(&conn)?;
        migrate_schema(&conn)?;
        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    /// A panic while holding the lock cannot leave a transaction open (it
    /// rolls back on drop), so a poisoned lock is still a usable connection.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run ad-hoc reads against the connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` inside one transaction on the locked connection. Nothing is
    /// committed unless `f` returns `Ok`.
    pub fn transaction<T, E>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Delete every analysis result. Path policies and feature settings are kept.
    pub fn truncate_all(&self) -> Result<()> {
        self.lock().execute_batch(
            "DELETE FROM duplicate_group_member;
             DELETE FROM duplicate_group;
             DELETE FROM file_checksum;
             DELETE FROM file_state;
             DELETE FROM similarity_metadata;
             DELETE FROM similarity_fingerprint;
             DELETE FROM classification;
             DELETE FROM app_storage_sample;",
        )?;
        debug!("All analysis tables truncated");
        Ok(())
    }
}

fn configure_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA cache_size = -16000;
         PRAGMA busy_timeout = 5000;",
    )?;
    debug!("SQLite pragmas configured (WAL mode, 16MB cache)");
    Ok(())
}

/// Analysis tables hold recomputable data and are rebuilt when their shape
/// changes; user settings tables are never dropped.
fn migrate_schema(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version > 0 && version < SCHEMA_VERSION {
        debug!(
            "Schema version {} < {}, dropping analysis tables",
            version, SCHEMA_VERSION
        );
        conn.execute_batch(
            "DROP TABLE IF EXISTS duplicate_group_member;
             DROP TABLE IF EXISTS duplicate_group;
             DROP TABLE IF EXISTS file_checksum;
             DROP TABLE IF EXISTS file_state;
             DROP TABLE IF EXISTS similarity_metadata;
             DROP TABLE IF EXISTS similarity_fingerprint;
             DROP TABLE IF EXISTS classification;",
        )?;
    }

    conn.execute_batch(include_str!("schema.sql"))?;
    conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
    debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
    Ok(())
}
