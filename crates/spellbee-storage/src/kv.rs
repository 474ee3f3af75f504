//! Document key-value store.
//!
//! Records are JSON values addressed by `(collection, key)`. A put replaces
//! the whole document.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use serde_json::Value;
use tracing::debug;

use spellbee_core::error::{Result, SpellbeeError};

use crate::db::Database;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a document, or `None` when absent.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>>;

    /// Write a document, replacing any previous one.
    async fn put(&self, collection: &str, key: &str, value: Value) -> Result<()>;
}

// =============================================================================
// SQLite
// =============================================================================

/// Document store on the `documents` table.
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    db: Arc<Database>,
}

impl SqliteKeyValueStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let body: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
                rusqlite::params![collection, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SpellbeeError::Storage(format!("Failed to read {}/{}: {}", collection, key, e)))
        })?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, collection: &str, key: &str, value: Value) -> Result<()> {
        let body = serde_json::to_string(&value)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents (collection, key, body, updated_at)
                 VALUES (?1, ?2, ?3, strftime('%s', 'now'))
                 ON CONFLICT (collection, key)
                 DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                rusqlite::params![collection, key, body],
            )
            .map_err(|e| {
                SpellbeeError::Storage(format!("Failed to write {}/{}: {}", collection, key, e))
            })?;
            Ok(())
        })?;
        debug!(collection, key, "Document written");
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// In-memory document store for tests, with switchable read/write failure.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    docs: Mutex<HashMap<(String, String), Value>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `put` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), Value>>> {
        self.docs
            .lock()
            .map_err(|e| SpellbeeError::Storage(format!("Store lock poisoned: {}", e)))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SpellbeeError::Storage(format!(
                "Simulated read failure for {}/{}",
                collection, key
            )));
        }
        let docs = self.lock()?;
        Ok(docs.get(&(collection.to_string(), key.to_string())).cloned())
    }

    async fn put(&self, collection: &str, key: &str, value: Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SpellbeeError::Storage(format!(
                "Simulated write failure for {}/{}",
                collection, key
            )));
        }
        let mut docs = self.lock()?;
        docs.insert((collection.to_string(), key.to_string()), value);
        Ok(())
    }
}
