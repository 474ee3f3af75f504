//! Spellbee Storage crate - document and blob persistence, the practice
//! ledger, and stale audio cleanup.
//!
//! Provides a WAL-mode SQLite document store with migrations, a filesystem
//! blob store, in-memory doubles of both for tests, and the repository that
//! maps spelling lists, practice records and settings onto collections.

pub mod blob;
pub mod cleanup;
pub mod db;
pub mod kv;
pub mod ledger;
pub mod migrations;
pub mod repository;

pub use blob::{BlobListing, BlobStore, FsBlobStore, MemoryBlobStore};
pub use cleanup::{cleanup_stale_audio, CleanupReport};
pub use db::Database;
pub use kv::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use ledger::PracticeLedger;
pub use repository::SpellingRepository;
