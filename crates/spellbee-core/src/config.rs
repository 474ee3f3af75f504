use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SpellbeeError};
use crate::week::ReferenceZone;

/// Shortest allowed writing pause between words, in seconds.
pub const MIN_PAUSE_SECS: u64 = 5;
/// Longest allowed writing pause between words, in seconds.
pub const MAX_PAUSE_SECS: u64 = 30;

/// Spellbee settings, read from `~/.spellbee/config.toml` unless overridden.
///
/// Every section and field has a default, so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpellbeeConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub week: WeekConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl SpellbeeConfig {
    /// Parse the TOML file at `path`. Missing or malformed files are errors.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SpellbeeConfig = toml::from_str(&text)?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Like [`load`](Self::load), but any failure yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    /// Write as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Check values that deserialize fine but are out of range.
    pub fn validate(&self) -> Result<()> {
        self.week.zone()?;

        let pause = self.session.pause_secs;
        if !(MIN_PAUSE_SECS..=MAX_PAUSE_SECS).contains(&pause) {
            return Err(SpellbeeError::Config(format!(
                "session.pause_secs must be between {} and {}, got {}",
                MIN_PAUSE_SECS, MAX_PAUSE_SECS, pause
            )));
        }
        if self.session.speech_rate <= 0.0 || self.session.story_speech_rate <= 0.0 {
            return Err(SpellbeeError::Config(
                "speech rates must be positive".to_string(),
            ));
        }
        if self.storage.database_file.trim().is_empty() {
            return Err(SpellbeeError::Config(
                "storage.database_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Data directory with a leading `~` expanded against `$HOME`.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(&self.storage.database_file)
    }

    /// Root of the filesystem blob store. Audio keys live under `audio/` inside it.
    pub fn blob_root(&self) -> PathBuf {
        self.data_dir().join(&self.storage.blob_dir)
    }

    /// Default config file location: `~/.spellbee/config.toml`.
    pub fn default_path() -> PathBuf {
        expand_home("~/.spellbee/config.toml")
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database and audio files.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.spellbee/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Spelling-week settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeekConfig {
    /// "Europe/London", "UTC", or a fixed offset such as "+01:00".
    pub reference_zone: String,
}

impl Default for WeekConfig {
    fn default() -> Self {
        Self {
            reference_zone: ReferenceZone::EuropeLondon.to_string(),
        }
    }
}

impl WeekConfig {
    pub fn zone(&self) -> Result<ReferenceZone> {
        self.reference_zone.parse()
    }
}

/// Dictation session timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Writing pause after each word, in seconds (5-30).
    pub pause_secs: u64,
    /// Gap between the clips of one word.
    pub clip_gap_ms: u64,
    /// Gap between spelling clips during reveal-all.
    pub reveal_gap_ms: u64,
    /// How long the celebration effect lasts.
    pub celebration_ms: u64,
    /// On-device speech rate used when the story clip is unavailable.
    pub story_speech_rate: f32,
    /// On-device speech rate for every other fallback.
    pub speech_rate: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pause_secs: 10,
            clip_gap_ms: 500,
            reveal_gap_ms: 300,
            celebration_ms: 4000,
            story_speech_rate: 0.9,
            speech_rate: 1.0,
        }
    }
}

/// Storage locations, relative to `general.data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_file: String,
    pub blob_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "spellbee.db".to_string(),
            blob_dir: "blobs".to_string(),
        }
    }
}

/// Resolved session timing with the pause clamped into range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub pause: Duration,
    pub clip_gap: Duration,
    pub reveal_gap: Duration,
    pub celebration: Duration,
    pub speech_rate: f32,
    pub story_speech_rate: f32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl SessionSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        let pause_secs = config.pause_secs.clamp(MIN_PAUSE_SECS, MAX_PAUSE_SECS);
        Self {
            pause: Duration::from_secs(pause_secs),
            clip_gap: Duration::from_millis(config.clip_gap_ms),
            reveal_gap: Duration::from_millis(config.reveal_gap_ms),
            celebration: Duration::from_millis(config.celebration_ms),
            speech_rate: config.speech_rate,
            story_speech_rate: config.story_speech_rate,
        }
    }
}
