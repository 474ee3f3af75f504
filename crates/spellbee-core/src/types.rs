use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpellbeeError};
use crate::week::WeekId;

// =============================================================================
// Asset keys
// =============================================================================

/// The four per-word audio variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipKind {
    /// "The word is: ..."
    Word,
    /// The generated (or templated) sentence.
    Sentence,
    /// The bare word again.
    Repeat,
    /// Letter-by-letter readout.
    Spelling,
}

impl ClipKind {
    /// All per-word variants, in synthesis order.
    pub const ALL: [ClipKind; 4] = [
        ClipKind::Word,
        ClipKind::Sentence,
        ClipKind::Repeat,
        ClipKind::Spelling,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            ClipKind::Word => "word",
            ClipKind::Sentence => "sentence",
            ClipKind::Repeat => "repeat",
            ClipKind::Spelling => "spelling",
        }
    }
}

/// Identifies one audio asset of a spelling list.
///
/// Serialized as `word_<w>`, `sentence_<w>`, `repeat_<w>`, `spelling_<w>` or
/// `story`, which is also the blob file stem.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AssetKey {
    Clip(ClipKind, String),
    Story,
}

impl AssetKey {
    pub fn clip(kind: ClipKind, word: impl Into<String>) -> Self {
        AssetKey::Clip(kind, word.into())
    }

    pub fn word(&self) -> Option<&str> {
        match self {
            AssetKey::Clip(_, word) => Some(word),
            AssetKey::Story => None,
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKey::Clip(kind, word) => write!(f, "{}_{}", kind.prefix(), word),
            AssetKey::Story => write!(f, "story"),
        }
    }
}

impl FromStr for AssetKey {
    type Err = SpellbeeError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "story" {
            return Ok(AssetKey::Story);
        }
        let (prefix, word) = s
            .split_once('_')
            .ok_or_else(|| SpellbeeError::InvalidInput(format!("Unknown asset key: {}", s)))?;
        let kind = ClipKind::ALL
            .into_iter()
            .find(|k| k.prefix() == prefix)
            .ok_or_else(|| SpellbeeError::InvalidInput(format!("Unknown asset key: {}", s)))?;
        if word.is_empty() {
            return Err(SpellbeeError::InvalidInput(format!(
                "Asset key has no word: {}",
                s
            )));
        }
        Ok(AssetKey::Clip(kind, word.to_string()))
    }
}

impl TryFrom<String> for AssetKey {
    type Error = SpellbeeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AssetKey> for String {
    fn from(key: AssetKey) -> Self {
        key.to_string()
    }
}

// =============================================================================
// Records
// =============================================================================

/// Generated content for one group in one spelling week.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpellingList {
    #[serde(alias = "groupName")]
    pub group: String,
    pub week_id: WeekId,
    pub words: Vec<String>,
    #[serde(default)]
    pub sentences: BTreeMap<String, String>,
    #[serde(default)]
    pub story: String,
    #[serde(default, alias = "audioUrls")]
    pub audio_assets: BTreeMap<AssetKey, String>,
    pub created_at: DateTime<Utc>,
}

impl SpellingList {
    pub fn total_words(&self) -> usize {
        self.words.len()
    }

    pub fn asset(&self, key: &AssetKey) -> Option<&str> {
        self.audio_assets.get(key).map(String::as_str)
    }

    pub fn clip(&self, kind: ClipKind, word: &str) -> Option<&str> {
        self.asset(&AssetKey::clip(kind, word))
    }

    pub fn sentence(&self, word: &str) -> Option<&str> {
        self.sentences.get(word).map(String::as_str)
    }

    /// Keys expected for a complete list that have no stored asset.
    pub fn missing_assets(&self) -> Vec<AssetKey> {
        let mut missing: Vec<AssetKey> = self
            .words
            .iter()
            .flat_map(|w| ClipKind::ALL.into_iter().map(move |k| AssetKey::clip(k, w.clone())))
            .filter(|k| !self.audio_assets.contains_key(k))
            .collect();
        if !self.audio_assets.contains_key(&AssetKey::Story) {
            missing.push(AssetKey::Story);
        }
        missing
    }
}

/// One child's practice tally within a week.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildPractice {
    pub attempts: u32,
    pub last_practice_at: Option<DateTime<Utc>>,
}

/// Practice tallies for one group in one spelling week.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeRecord {
    pub group: String,
    pub week_id: WeekId,
    #[serde(default)]
    pub children: BTreeMap<String, ChildPractice>,
}

impl PracticeRecord {
    pub fn new(group: impl Into<String>, week_id: WeekId) -> Self {
        Self {
            group: group.into(),
            week_id,
            children: BTreeMap::new(),
        }
    }

    /// Count one practice attempt for `child` at `at`.
    pub fn record_attempt(&mut self, child: &str, at: DateTime<Utc>) -> u32 {
        let entry = self
            .children
            .entry(child.to_string())
            .or_insert(ChildPractice {
                attempts: 0,
                last_practice_at: None,
            });
        entry.attempts += 1;
        entry.last_practice_at = Some(at);
        entry.attempts
    }

    pub fn attempts(&self, child: &str) -> u32 {
        self.children.get(child).map(|c| c.attempts).unwrap_or(0)
    }
}

/// Provider credentials kept in the config collection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
}

impl ApiKeys {
    /// Overlay the non-empty fields of `update` onto `self`.
    pub fn merge(&mut self, update: ApiKeys) {
        if let Some(key) = update.anthropic.filter(|k| !k.trim().is_empty()) {
            self.anthropic = Some(key.trim().to_string());
        }
        if let Some(key) = update.openai.filter(|k| !k.trim().is_empty()) {
            self.openai = Some(key.trim().to_string());
        }
    }
}

// =============================================================================
// Word-list input
// =============================================================================

/// Normalise free text into a word list: split on commas and newlines,
/// trim, lowercase, drop empties. Order and duplicates are kept.
pub fn parse_word_list(text: &str) -> Vec<String> {
    text.split([',', '\n', '\r'])
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn week() -> WeekId {
        "2025-03-06".parse().unwrap()
    }

    #[test]
    fn test_asset_key_display_and_parse() {
        let key = AssetKey::clip(ClipKind::Spelling, "bridge");
        assert_eq!(key.to_string(), "spelling_bridge");
        assert_eq!("spelling_bridge".parse::<AssetKey>().unwrap(), key);
        assert_eq!("story".parse::<AssetKey>().unwrap(), AssetKey::Story);
        // Words may themselves contain underscores
        assert_eq!(
            "word_ice_cream".parse::<AssetKey>().unwrap(),
            AssetKey::clip(ClipKind::Word, "ice_cream")
        );
    }

    #[test]
    fn test_asset_key_rejects_garbage() {
        assert!("banana".parse::<AssetKey>().is_err());
        assert!("chorus_bridge".parse::<AssetKey>().is_err());
        assert!("word_".parse::<AssetKey>().is_err());
    }

    #[test]
    fn test_spelling_list_json_uses_asset_keys_as_map_keys() {
        let mut list = SpellingList {
            group: "OWLS".to_string(),
            week_id: week(),
            words: vec!["cat".to_string()],
            sentences: BTreeMap::new(),
            story: "Once.".to_string(),
            audio_assets: BTreeMap::new(),
            created_at: Utc.with_ymd_and_hms(2025, 3, 6, 13, 0, 0).unwrap(),
        };
        list.audio_assets.insert(
            AssetKey::clip(ClipKind::Word, "cat"),
            "file:///a/word_cat.mp3".to_string(),
        );

        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["weekId"], "2025-03-06");
        assert_eq!(json["audioAssets"]["word_cat"], "file:///a/word_cat.mp3");

        let back: SpellingList = serde_json::from_value(json).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn test_spelling_list_accepts_legacy_field_names() {
        let json = serde_json::json!({
            "groupName": "OWLS",
            "weekId": "2025-03-06",
            "words": ["cat"],
            "audioUrls": { "story": "file:///story.mp3" },
            "createdAt": "2025-03-06T13:00:00Z"
        });
        let list: SpellingList = serde_json::from_value(json).unwrap();
        assert_eq!(list.group, "OWLS");
        assert_eq!(list.asset(&AssetKey::Story), Some("file:///story.mp3"));
        assert!(list.sentences.is_empty());
    }

    #[test]
    fn test_missing_assets() {
        let mut list = SpellingList {
            group: "OWLS".to_string(),
            week_id: week(),
            words: vec!["cat".to_string()],
            sentences: BTreeMap::new(),
            story: String::new(),
            audio_assets: BTreeMap::new(),
            created_at: Utc::now(),
        };
        for kind in [ClipKind::Word, ClipKind::Repeat, ClipKind::Spelling] {
            list.audio_assets
                .insert(AssetKey::clip(kind, "cat"), "uri".to_string());
        }
        assert_eq!(
            list.missing_assets(),
            vec![AssetKey::clip(ClipKind::Sentence, "cat"), AssetKey::Story]
        );
    }

    #[test]
    fn test_practice_record_counts_attempts() {
        let mut record = PracticeRecord::new("OWLS", week());
        let t1 = Utc.with_ymd_and_hms(2025, 3, 7, 17, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 3, 8, 9, 0, 0).unwrap();
        assert_eq!(record.record_attempt("Ada", t1), 1);
        assert_eq!(record.record_attempt("Ada", t2), 2);
        assert_eq!(record.attempts("Ada"), 2);
        assert_eq!(record.attempts("Ben"), 0);
        assert_eq!(record.children["Ada"].last_practice_at, Some(t2));
    }

    #[test]
    fn test_api_keys_merge_keeps_existing_on_blank() {
        let mut keys = ApiKeys {
            anthropic: Some("a-1".to_string()),
            openai: Some("o-1".to_string()),
        };
        keys.merge(ApiKeys {
            anthropic: Some("  ".to_string()),
            openai: Some("o-2".to_string()),
        });
        assert_eq!(keys.anthropic.as_deref(), Some("a-1"));
        assert_eq!(keys.openai.as_deref(), Some("o-2"));
    }

    #[test]
    fn test_parse_word_list() {
        assert_eq!(
            parse_word_list(" Cat, DOG\nbridge,,\r\n  knee ,cat"),
            vec!["cat", "dog", "bridge", "knee", "cat"]
        );
        assert!(parse_word_list(" , \n ").is_empty());
    }
}
