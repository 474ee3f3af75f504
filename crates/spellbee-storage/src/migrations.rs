//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use spellbee_core::error::SpellbeeError;

/// Schema steps, applied in order. Append only.
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "documents",
    "CREATE TABLE IF NOT EXISTS documents (
        collection  TEXT NOT NULL,
        key         TEXT NOT NULL,
        body        TEXT NOT NULL,
        updated_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
        PRIMARY KEY (collection, key)
    );",
)];

/// Highest applied schema version, or 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<i64, SpellbeeError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| SpellbeeError::Storage(format!("Failed to query schema version: {}", e)))
}

/// Bring the schema up to date.
pub fn run_migrations(conn: &Connection) -> Result<(), SpellbeeError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| SpellbeeError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current = schema_version(conn)?;
    for &(version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        conn.execute_batch(sql)
            .and_then(|_| {
                conn.execute(
                    "INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![version, name],
                )
            })
            .map_err(|e| {
                SpellbeeError::Storage(format!("Migration v{} ({}) failed: {}", version, name, e))
            })?;
        info!(version, name, "Applied migration");
    }

    Ok(())
}
