//! Spelling content pipeline.
//!
//! Turns a group's word list into a persisted [`SpellingList`]:
//! 1. Text generation (0-30%): sentences and story in one call. Fatal.
//! 2. Per-word clips (30-90%): word, sentence, repeat and spelling audio,
//!    each synthesized and uploaded. Per-clip failures are recorded and the
//!    run continues.
//! 3. Story clip (90%): failure is recorded, not fatal.
//! 4. Persist (95-100%): replace the stored list for `(week_id, group)`. Fatal.
//!
//! Nothing is persisted unless step 1 succeeds. Audio uploaded before a
//! failed persist is left orphaned.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use spellbee_core::clock::Clock;
use spellbee_core::error::{Result, SpellbeeError};
use spellbee_core::script;
use spellbee_core::types::{AssetKey, ClipKind, SpellingList};
use spellbee_core::week::{WeekClock, WeekId};
use spellbee_storage::blob::BlobStore;
use spellbee_storage::repository::SpellingRepository;

use crate::progress::{Monotonic, ProgressReporter};
use crate::providers::{SpeechSynthesizer, TextGenerator};

/// Outcome of producing one audio asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    /// Uploaded; holds the playable URI.
    Stored(String),
    /// Synthesis or upload failed; holds the reason.
    Failed(String),
}

impl AssetOutcome {
    pub fn uri(&self) -> Option<&str> {
        match self {
            AssetOutcome::Stored(uri) => Some(uri),
            AssetOutcome::Failed(_) => None,
        }
    }
}

/// A persisted list plus the outcome of every attempted asset, in order.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub list: SpellingList,
    pub outcomes: Vec<(AssetKey, AssetOutcome)>,
}

impl GenerationReport {
    pub fn failed_assets(&self) -> Vec<&AssetKey> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, AssetOutcome::Failed(_)))
            .map(|(key, _)| key)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_assets().is_empty()
    }
}

/// Blob path for an asset: `audio/{weekId}/{group}/{assetKey}.mp3`.
///
/// The group and asset key are percent-encoded so each stays a single
/// path segment (`Y3/4` becomes `Y3%2F4`).
pub fn asset_path(week_id: WeekId, group: &str, key: &AssetKey) -> String {
    format!(
        "audio/{}/{}/{}.mp3",
        week_id,
        path_segment(group),
        path_segment(&key.to_string())
    )
}

fn path_segment(raw: &str) -> String {
    match raw {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(raw).into_owned(),
    }
}

pub struct ContentPipeline {
    text: Arc<dyn TextGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
    blobs: Arc<dyn BlobStore>,
    repo: SpellingRepository,
    clock: Arc<dyn Clock>,
    week_clock: WeekClock,
}

impl ContentPipeline {
    pub fn new(
        text: Arc<dyn TextGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        blobs: Arc<dyn BlobStore>,
        repo: SpellingRepository,
        clock: Arc<dyn Clock>,
        week_clock: WeekClock,
    ) -> Self {
        Self {
            text,
            speech,
            blobs,
            repo,
            clock,
            week_clock,
        }
    }

    /// Generate and persist content for `group` in the current week.
    ///
    /// Re-running for the same group and week replaces the previous list.
    pub async fn generate(
        &self,
        group: &str,
        words: &[String],
        progress: &dyn ProgressReporter,
    ) -> Result<GenerationReport> {
        let group = group.trim();
        if group.is_empty() {
            return Err(SpellbeeError::InvalidInput(
                "Group name must not be empty".to_string(),
            ));
        }
        let words: Vec<String> = words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return Err(SpellbeeError::InvalidInput(
                "Word list must not be empty".to_string(),
            ));
        }

        let created_at = self.clock.now();
        let week_id = self.week_clock.week_id(created_at);
        let mut progress = Monotonic::new(progress);
        info!(group, week_id = %week_id, words = words.len(), "Content generation started");

        // Step 1: sentences and story.
        progress.report(0, "Writing sentences and story");
        let content = self.text.generate(&words).await.map_err(|e| {
            warn!(group, week_id = %week_id, error = %e, "Text generation failed");
            e
        })?;
        progress.report(30, "Recording audio");

        // Step 2: four clips per word.
        let total_steps = words.len() * ClipKind::ALL.len() + 1;
        let mut step = 0usize;
        let mut outcomes: Vec<(AssetKey, AssetOutcome)> = Vec::with_capacity(total_steps);

        for (i, word) in words.iter().enumerate() {
            let sentence = content.sentences.get(word).map(String::as_str);
            for kind in ClipKind::ALL {
                let key = AssetKey::clip(kind, word.clone());
                let text = script::utterance(kind, word, sentence);
                let outcome = self.store_clip(week_id, group, &key, &text).await;
                outcomes.push((key, outcome));

                step += 1;
                progress.report(
                    clip_percent(step, total_steps),
                    format!("Recording audio for word {} of {}", i + 1, words.len()),
                );
            }
        }

        // Step 3: story.
        let story_outcome = if content.story.trim().is_empty() {
            warn!(group, week_id = %week_id, "No story text generated, skipping story audio");
            AssetOutcome::Failed("No story text".to_string())
        } else {
            self.store_clip(week_id, group, &AssetKey::Story, &content.story)
                .await
        };
        outcomes.push((AssetKey::Story, story_outcome));
        progress.report(90, "Story recorded");

        // Step 4: persist.
        progress.report(95, "Saving");
        let audio_assets: BTreeMap<AssetKey, String> = outcomes
            .iter()
            .filter_map(|(key, outcome)| outcome.uri().map(|uri| (key.clone(), uri.to_string())))
            .collect();
        let list = SpellingList {
            group: group.to_string(),
            week_id,
            words,
            sentences: content.sentences,
            story: content.story,
            audio_assets,
            created_at,
        };
        self.repo.save_spelling_list(&list).await.map_err(|e| {
            warn!(group, week_id = %week_id, error = %e, "Failed to persist spelling list");
            e
        })?;
        progress.report(100, "Done");

        let report = GenerationReport { list, outcomes };
        info!(
            group,
            week_id = %week_id,
            stored = report.list.audio_assets.len(),
            failed = report.failed_assets().len(),
            "Content generation complete"
        );
        Ok(report)
    }

    /// Synthesize and upload one clip. Never fails the run.
    async fn store_clip(
        &self,
        week_id: WeekId,
        group: &str,
        key: &AssetKey,
        text: &str,
    ) -> AssetOutcome {
        let bytes = match self.speech.synthesize(text).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(asset = %key, error = %e, "Speech synthesis failed, asset omitted");
                return AssetOutcome::Failed(e.to_string());
            }
        };

        let path = asset_path(week_id, group, key);
        match self.blobs.put(&path, bytes).await {
            Ok(uri) => {
                debug!(asset = %key, path = %path, "Asset stored");
                AssetOutcome::Stored(uri)
            }
            Err(e) => {
                warn!(asset = %key, error = %e, "Asset upload failed, asset omitted");
                AssetOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Percentage after `step` of `total` clip attempts, within 30..90.
fn clip_percent(step: usize, total: usize) -> u8 {
    (30 + (60 * step) / total.max(1)).min(90) as u8
}
