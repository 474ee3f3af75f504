//! Blob storage for audio assets.
//!
//! Paths are `/`-separated and relative (`audio/2025-03-06/OWLS/word_cat.mp3`).
//! `put` returns a URI that a player can open directly.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use spellbee_core::error::{Result, SpellbeeError};

/// Immediate children of a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobListing {
    /// Sub-folder names.
    pub folders: Vec<String>,
    /// Blob names directly under the prefix.
    pub items: Vec<String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`, replacing any existing blob. Returns its URI.
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<String>;

    /// URI of the blob at `path`, if present.
    async fn get(&self, path: &str) -> Result<Option<String>>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Immediate children of `prefix`, both sorted by name.
    async fn list(&self, prefix: &str) -> Result<BlobListing>;
}

/// Reject absolute paths and `..` so a blob can never escape its root.
fn validate_path(path: &str) -> Result<()> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() && !path.is_empty() {
        return Err(SpellbeeError::InvalidInput(format!("Invalid blob path: {}", path)));
    }
    let ok = Path::new(trimmed)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !ok || path.starts_with('/') {
        return Err(SpellbeeError::InvalidInput(format!("Invalid blob path: {}", path)));
    }
    Ok(())
}

// =============================================================================
// Filesystem
// =============================================================================

/// Blob store rooted at a local directory; URIs are `file://` URLs.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        validate_path(path)?;
        Ok(self.root.join(path.trim_matches('/')))
    }

    /// Percent-encoded `file://` URL of an existing file.
    async fn uri_for(file: &Path) -> Result<String> {
        let absolute = tokio::fs::canonicalize(file)
            .await
            .map_err(|e| SpellbeeError::Blob(format!("Failed to resolve {}: {}", file.display(), e)))?;
        Url::from_file_path(&absolute)
            .map(String::from)
            .map_err(|_| SpellbeeError::Blob(format!("Not a file URL: {}", absolute.display())))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SpellbeeError::Blob(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&file, &bytes)
            .await
            .map_err(|e| SpellbeeError::Blob(format!("Failed to write {}: {}", path, e)))?;
        debug!(path, bytes = bytes.len(), "Blob stored");
        Self::uri_for(&file).await
    }

    async fn get(&self, path: &str) -> Result<Option<String>> {
        let file = self.resolve(path)?;
        match tokio::fs::metadata(&file).await {
            Ok(meta) if meta.is_file() => Self::uri_for(&file).await.map(Some),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SpellbeeError::Blob(format!("Failed to stat {}: {}", path, e))),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let file = self.resolve(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SpellbeeError::Blob(format!("Failed to delete {}: {}", path, e))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<BlobListing> {
        let dir = if prefix.trim_matches('/').is_empty() {
            self.root.clone()
        } else {
            self.resolve(prefix)?
        };

        let mut listing = BlobListing::default();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(listing),
            Err(e) => {
                return Err(SpellbeeError::Blob(format!("Failed to list {}: {}", prefix, e)))
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SpellbeeError::Blob(format!("Failed to list {}: {}", prefix, e)))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| SpellbeeError::Blob(format!("Failed to stat {}: {}", name, e)))?;
            if file_type.is_dir() {
                listing.folders.push(name);
            } else {
                listing.items.push(name);
            }
        }
        listing.folders.sort();
        listing.items.sort();
        Ok(listing)
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// In-memory blob store for tests. URIs are `memory://<path>`.
///
/// Paths containing any registered failure pattern fail on `put` or
/// `delete`, which lets tests target a single asset.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    failing_puts: Mutex<Vec<String>>,
    failing_deletes: Mutex<Vec<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `put` whose path contains `pattern`.
    pub fn fail_puts_containing(&self, pattern: impl Into<String>) {
        if let Ok(mut patterns) = self.failing_puts.lock() {
            patterns.push(pattern.into());
        }
    }

    /// Fail every `delete` whose path contains `pattern`.
    pub fn fail_deletes_containing(&self, pattern: impl Into<String>) {
        if let Ok(mut patterns) = self.failing_deletes.lock() {
            patterns.push(pattern.into());
        }
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.blobs
            .lock()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.lock().ok().and_then(|b| b.get(path).cloned())
    }

    fn matches(patterns: &Mutex<Vec<String>>, path: &str) -> bool {
        patterns
            .lock()
            .map(|p| p.iter().any(|pat| path.contains(pat.as_str())))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|e| SpellbeeError::Blob(format!("Blob store lock poisoned: {}", e)))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        validate_path(path)?;
        if Self::matches(&self.failing_puts, path) {
            return Err(SpellbeeError::Blob(format!("Simulated upload failure: {}", path)));
        }
        self.lock()?.insert(path.to_string(), bytes);
        Ok(format!("memory://{}", path))
    }

    async fn get(&self, path: &str) -> Result<Option<String>> {
        validate_path(path)?;
        Ok(self
            .lock()?
            .contains_key(path)
            .then(|| format!("memory://{}", path)))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        validate_path(path)?;
        if Self::matches(&self.failing_deletes, path) {
            return Err(SpellbeeError::Blob(format!("Simulated delete failure: {}", path)));
        }
        self.lock()?.remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<BlobListing> {
        let trimmed = prefix.trim_matches('/');
        let base = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        };

        let mut folders = BTreeSet::new();
        let mut items = BTreeSet::new();
        for path in self.lock()?.keys() {
            if let Some(rest) = path.strip_prefix(&base) {
                match rest.split_once('/') {
                    Some((folder, _)) => folders.insert(folder.to_string()),
                    None => items.insert(rest.to_string()),
                };
            }
        }
        Ok(BlobListing {
            folders: folders.into_iter().collect(),
            items: items.into_iter().collect(),
        })
    }
}
