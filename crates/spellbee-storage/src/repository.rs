//! Maps Spellbee documents onto key-value collections.
//!
//! | collection | key                 | document        |
//! |------------|---------------------|-----------------|
//! | `config`   | `apiKeys`           | [`ApiKeys`]     |
//! | `config`   | `groups`            | `{ groups }`    |
//! | `config`   | `children`          | `{ names }`     |
//! | `weeks`    | `{weekId}_{group}`  | [`SpellingList`]|
//! | `practice` | `{weekId}_{group}`  | [`PracticeRecord`] |
//!
//! Optional settings documents degrade to empty defaults when they cannot be
//! read. Writes always propagate errors.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use spellbee_core::error::Result;
use spellbee_core::types::{ApiKeys, PracticeRecord, SpellingList};
use spellbee_core::week::WeekId;

use crate::kv::KeyValueStore;

const CONFIG: &str = "config";
const WEEKS: &str = "weeks";
const PRACTICE: &str = "practice";

const API_KEYS: &str = "apiKeys";
const GROUPS: &str = "groups";
const CHILDREN: &str = "children";

#[derive(Debug, Default, Serialize, Deserialize)]
struct GroupsDoc {
    #[serde(default)]
    groups: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChildrenDoc {
    #[serde(default)]
    names: Vec<String>,
}

/// Key for week-scoped documents.
pub fn week_key(week_id: WeekId, group: &str) -> String {
    format!("{}_{}", week_id, group)
}

/// Trim, upper-case and drop empty group names, keeping first occurrences.
pub fn normalize_groups(groups: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for g in groups {
        let g = g.trim().to_uppercase();
        if !g.is_empty() && !out.contains(&g) {
            out.push(g);
        }
    }
    out
}

#[derive(Clone)]
pub struct SpellingRepository {
    kv: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for SpellingRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpellingRepository").finish()
    }
}

impl SpellingRepository {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    async fn read<T: DeserializeOwned>(&self, collection: &str, key: &str) -> Result<Option<T>> {
        match self.kv.get(collection, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize>(&self, collection: &str, key: &str, doc: &T) -> Result<()> {
        let value = serde_json::to_value(doc)?;
        self.kv.put(collection, key, value).await
    }

    /// Read an optional settings document, falling back to its default.
    async fn read_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.read::<T>(CONFIG, key).await {
            Ok(doc) => doc.unwrap_or_default(),
            Err(e) => {
                warn!(key, error = %e, "Failed to read settings document, using defaults");
                T::default()
            }
        }
    }

    // --- settings -----------------------------------------------------------

    pub async fn api_keys(&self) -> ApiKeys {
        self.read_or_default(API_KEYS).await
    }

    /// Merge the non-empty fields of `update` into the stored keys.
    pub async fn save_api_keys(&self, update: ApiKeys) -> Result<ApiKeys> {
        let mut keys = self.api_keys().await;
        keys.merge(update);
        self.write(CONFIG, API_KEYS, &keys).await?;
        info!("API keys updated");
        Ok(keys)
    }

    pub async fn groups(&self) -> Vec<String> {
        self.read_or_default::<GroupsDoc>(GROUPS).await.groups
    }

    pub async fn save_groups(&self, groups: &[String]) -> Result<Vec<String>> {
        let groups = normalize_groups(groups);
        self.write(
            CONFIG,
            GROUPS,
            &GroupsDoc {
                groups: groups.clone(),
            },
        )
        .await?;
        info!(count = groups.len(), "Groups saved");
        Ok(groups)
    }

    /// Known child names, sorted.
    pub async fn children(&self) -> Vec<String> {
        let mut names = self.read_or_default::<ChildrenDoc>(CHILDREN).await.names;
        names.sort();
        names.dedup();
        names
    }

    pub async fn save_children(&self, names: &[String]) -> Result<Vec<String>> {
        let mut names: Vec<String> = names
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        names.sort();
        names.dedup();
        self.write(
            CONFIG,
            CHILDREN,
            &ChildrenDoc {
                names: names.clone(),
            },
        )
        .await?;
        Ok(names)
    }

    /// Add a child name. Returns `false` if it was already known.
    pub async fn add_child(&self, name: &str) -> Result<bool> {
        let name = name.trim();
        let mut names = self.children().await;
        if name.is_empty() || names.iter().any(|n| n == name) {
            return Ok(false);
        }
        names.push(name.to_string());
        self.save_children(&names).await?;
        info!(child = name, "Child added");
        Ok(true)
    }

    /// Remove a child name. Returns `false` if it was not known.
    pub async fn remove_child(&self, name: &str) -> Result<bool> {
        let name = name.trim();
        let mut names = self.children().await;
        let before = names.len();
        names.retain(|n| n != name);
        if names.len() == before {
            return Ok(false);
        }
        self.save_children(&names).await?;
        info!(child = name, "Child removed");
        Ok(true)
    }

    // --- week content -------------------------------------------------------

    /// The list stored for `(week_id, group)`, only if it belongs to `week_id`.
    pub async fn spelling_list(&self, group: &str, week_id: WeekId) -> Result<Option<SpellingList>> {
        let list: Option<SpellingList> = self.read(WEEKS, &week_key(week_id, group)).await?;
        Ok(list.filter(|l| l.week_id == week_id))
    }

    /// Replace the stored list for the list's own `(week_id, group)`.
    pub async fn save_spelling_list(&self, list: &SpellingList) -> Result<()> {
        self.write(WEEKS, &week_key(list.week_id, &list.group), list)
            .await
    }

    // --- practice -----------------------------------------------------------

    pub async fn practice_record(
        &self,
        group: &str,
        week_id: WeekId,
    ) -> Result<Option<PracticeRecord>> {
        let record: Option<PracticeRecord> =
            self.read(PRACTICE, &week_key(week_id, group)).await?;
        Ok(record.filter(|r| r.week_id == week_id))
    }

    pub async fn save_practice_record(&self, record: &PracticeRecord) -> Result<()> {
        self.write(PRACTICE, &week_key(record.week_id, &record.group), record)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKeyValueStore;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn week(s: &str) -> WeekId {
        s.parse().unwrap()
    }

    fn repo() -> (Arc<MemoryKeyValueStore>, SpellingRepository) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        (kv.clone(), SpellingRepository::new(kv))
    }

    fn list(group: &str, week_id: WeekId) -> SpellingList {
        SpellingList {
            group: group.to_string(),
            week_id,
            words: vec!["cat".to_string()],
            sentences: BTreeMap::new(),
            story: "A cat.".to_string(),
            audio_assets: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_groups_are_normalized() {
        let (_, repo) = repo();
        let saved = repo
            .save_groups(&[" owls ".to_string(), "".to_string(), "Foxes".to_string(), "OWLS".to_string()])
            .await
            .unwrap();
        assert_eq!(saved, vec!["OWLS", "FOXES"]);
        assert_eq!(repo.groups().await, vec!["OWLS", "FOXES"]);
    }

    #[tokio::test]
    async fn test_children_add_remove() {
        let (_, repo) = repo();
        assert!(repo.add_child("Zed").await.unwrap());
        assert!(repo.add_child(" Ada ").await.unwrap());
        assert!(!repo.add_child("Ada").await.unwrap());
        assert_eq!(repo.children().await, vec!["Ada", "Zed"]);

        assert!(repo.remove_child("Zed").await.unwrap());
        assert!(!repo.remove_child("Zed").await.unwrap());
        assert_eq!(repo.children().await, vec!["Ada"]);
    }

    #[tokio::test]
    async fn test_settings_read_failure_degrades_to_defaults() {
        let (kv, repo) = repo();
        repo.save_groups(&["OWLS".to_string()]).await.unwrap();
        kv.set_fail_reads(true);
        assert!(repo.groups().await.is_empty());
        assert!(repo.children().await.is_empty());
        assert_eq!(repo.api_keys().await, ApiKeys::default());
    }

    #[tokio::test]
    async fn test_api_keys_merge_on_save() {
        let (_, repo) = repo();
        repo.save_api_keys(ApiKeys {
            anthropic: Some("a-1".to_string()),
            openai: None,
        })
        .await
        .unwrap();
        let keys = repo
            .save_api_keys(ApiKeys {
                anthropic: None,
                openai: Some("o-1".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(keys.anthropic.as_deref(), Some("a-1"));
        assert_eq!(keys.openai.as_deref(), Some("o-1"));
    }

    #[tokio::test]
    async fn test_spelling_list_scoped_to_week() {
        let (kv, repo) = repo();
        let this_week = week("2025-03-06");
        let last_week = week("2025-02-27");

        repo.save_spelling_list(&list("OWLS", this_week)).await.unwrap();
        assert!(repo.spelling_list("OWLS", this_week).await.unwrap().is_some());
        assert!(repo.spelling_list("OWLS", last_week).await.unwrap().is_none());
        assert!(repo.spelling_list("FOXES", this_week).await.unwrap().is_none());

        // A document filed under this week's key but stamped with an old week is absent
        let stale = serde_json::to_value(list("FOXES", last_week)).unwrap();
        kv.put("weeks", "2025-03-06_FOXES", stale).await.unwrap();
        assert!(repo.spelling_list("FOXES", this_week).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_list_is_an_error() {
        let (kv, repo) = repo();
        kv.put("weeks", "2025-03-06_OWLS", json!({ "words": 3 }))
            .await
            .unwrap();
        assert!(repo.spelling_list("OWLS", week("2025-03-06")).await.is_err());
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let (kv, repo) = repo();
        kv.set_fail_writes(true);
        assert!(repo.save_spelling_list(&list("OWLS", week("2025-03-06"))).await.is_err());
        assert!(repo.save_groups(&["OWLS".to_string()]).await.is_err());
    }
}
