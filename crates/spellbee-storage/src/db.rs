//! SQLite handle for the document store.
//!
//! One connection behind a `Mutex`. File databases run in WAL mode with a
//! busy timeout so the CLI and a running app can share the file. The schema
//! is migrated on open.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::info;

use spellbee_core::error::SpellbeeError;

use crate::migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file, creating parent directories.
    pub fn new(path: &Path) -> Result<Self, SpellbeeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| {
            SpellbeeError::Storage(format!("Failed to open {}: {}", path.display(), e))
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .and_then(|_| {
                conn.execute_batch(
                    "PRAGMA journal_mode = WAL;
                     PRAGMA synchronous = NORMAL;",
                )
            })
            .map_err(|e| SpellbeeError::Storage(format!("Failed to configure database: {}", e)))?;

        let db = Self::migrated(conn)?;
        info!(path = %path.display(), schema = db.schema_version()?, "Database opened");
        Ok(db)
    }

    /// Fresh in-memory database, for tests.
    pub fn in_memory() -> Result<Self, SpellbeeError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SpellbeeError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::migrated(conn)
    }

    fn migrated(conn: Connection) -> Result<Self, SpellbeeError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    pub fn schema_version(&self) -> Result<i64, SpellbeeError> {
        self.with_conn(migrations::schema_version)
    }

    /// Run `f` with the connection. The lock is held for the whole call.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, SpellbeeError>
    where
        F: FnOnce(&Connection) -> Result<T, SpellbeeError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SpellbeeError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
