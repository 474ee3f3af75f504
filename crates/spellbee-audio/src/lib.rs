//! Spellbee Audio crate - single-channel playback with an on-device speech
//! fallback.
//!
//! `AudioManager` owns the one audio output. Starting anything stops what
//! was playing first. A stored clip that is missing or fails to play is
//! re-rendered through on-device speech, and that path never errors.
//! Recording mocks are provided for tests without real audio hardware.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use spellbee_core::error::{Result, SpellbeeError};

// =============================================================================
// Enums
// =============================================================================

/// How a playback request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The stored clip played to the end.
    Played,
    /// The clip was missing or failed, and the text was spoken instead.
    Spoken,
    /// Cancelled, or pre-empted by another playback.
    Cancelled,
}

// =============================================================================
// Traits
// =============================================================================

/// Plays stored audio by URI.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Play `uri` to completion.
    async fn play(&self, uri: &str) -> Result<()>;

    /// Halt whatever is playing. A pending `play` may then resolve.
    fn stop(&self);
}

/// On-device text-to-speech.
#[async_trait]
pub trait SpeechFallback: Send + Sync {
    /// Speak `text` at `rate` (1.0 = normal). Resolves when speech ends or
    /// fails; failures are swallowed by the implementation.
    async fn speak(&self, text: &str, rate: f32);

    fn stop(&self);
}

// =============================================================================
// Manager
// =============================================================================

struct ActiveSlot {
    id: u64,
    token: CancellationToken,
}

/// Exclusive owner of the audio output.
pub struct AudioManager {
    player: Arc<dyn AudioPlayer>,
    speech: Arc<dyn SpeechFallback>,
    active: Mutex<Option<ActiveSlot>>,
    next_id: AtomicU64,
}

impl AudioManager {
    pub fn new(player: Arc<dyn AudioPlayer>, speech: Arc<dyn SpeechFallback>) -> Self {
        Self {
            player,
            speech,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Play the clip at `uri`, or speak `text` if there is no clip or it
    /// fails. Returns early with `Cancelled` when `cancel` fires or another
    /// playback takes over the output.
    pub async fn play_or_speak(
        &self,
        uri: Option<&str>,
        text: &str,
        rate: f32,
        cancel: &CancellationToken,
    ) -> PlaybackOutcome {
        if cancel.is_cancelled() {
            return PlaybackOutcome::Cancelled;
        }
        let (id, slot) = self.begin();

        let outcome = match uri {
            Some(uri) => {
                let played = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    _ = slot.cancelled() => None,
                    result = self.player.play(uri) => Some(result),
                };
                match played {
                    None => {
                        self.player.stop();
                        PlaybackOutcome::Cancelled
                    }
                    Some(Ok(())) => PlaybackOutcome::Played,
                    Some(Err(e)) => {
                        warn!(uri, error = %e, "Clip playback failed, speaking instead");
                        self.speak_within(text, rate, cancel, &slot).await
                    }
                }
            }
            None => {
                debug!("No stored clip, speaking instead");
                self.speak_within(text, rate, cancel, &slot).await
            }
        };

        self.finish(id);
        outcome
    }

    /// Speak `text` through the fallback, without trying a clip.
    pub async fn speak(&self, text: &str, rate: f32, cancel: &CancellationToken) -> PlaybackOutcome {
        self.play_or_speak(None, text, rate, cancel).await
    }

    /// Stop whatever is playing.
    pub fn stop(&self) {
        if let Some(slot) = self.take_slot() {
            slot.token.cancel();
        }
        self.player.stop();
        self.speech.stop();
    }

    pub fn is_playing(&self) -> bool {
        match self.active.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    async fn speak_within(
        &self,
        text: &str,
        rate: f32,
        cancel: &CancellationToken,
        slot: &CancellationToken,
    ) -> PlaybackOutcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.speech.stop();
                PlaybackOutcome::Cancelled
            }
            _ = slot.cancelled() => {
                self.speech.stop();
                PlaybackOutcome::Cancelled
            }
            _ = self.speech.speak(text, rate) => PlaybackOutcome::Spoken,
        }
    }

    /// Stop the current activity and claim the output.
    fn begin(&self) -> (u64, CancellationToken) {
        self.stop();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        let slot = ActiveSlot {
            id,
            token: token.clone(),
        };
        match self.active.lock() {
            Ok(mut guard) => *guard = Some(slot),
            Err(poisoned) => *poisoned.into_inner() = Some(slot),
        }
        (id, token)
    }

    /// Release the output if `id` still holds it.
    fn finish(&self, id: u64) {
        let mut guard = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.as_ref().map(|s| s.id) == Some(id) {
            *guard = None;
        }
    }

    fn take_slot(&self) -> Option<ActiveSlot> {
        match self.active.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

// =============================================================================
// Mock implementations
// =============================================================================

/// Something the mock audio output did.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// A clip started playing.
    Played(String),
    /// A clip failed to play.
    Failed(String),
    /// Text was spoken at a rate.
    Spoke(String, f32),
}

/// Shared, ordered log of mock audio events.
#[derive(Debug, Clone, Default)]
pub struct AudioLog {
    events: Arc<Mutex<Vec<AudioEvent>>>,
}

impl AudioLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: AudioEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<AudioEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// URIs of clips that started playing, in order.
    pub fn played(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AudioEvent::Played(uri) => Some(uri),
                _ => None,
            })
            .collect()
    }

    /// Texts spoken, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AudioEvent::Spoke(text, _) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

/// Mock player: each clip "plays" for a fixed duration of tokio time.
/// URIs containing a registered pattern fail immediately.
pub struct RecordingPlayer {
    log: AudioLog,
    clip_length: Duration,
    failing: Mutex<Vec<String>>,
    stops: AtomicUsize,
}

impl RecordingPlayer {
    pub fn new(log: AudioLog, clip_length: Duration) -> Self {
        Self {
            log,
            clip_length,
            failing: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        }
    }

    /// Fail any URI containing `pattern`.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.push(pattern.into());
        }
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPlayer for RecordingPlayer {
    async fn play(&self, uri: &str) -> Result<()> {
        let fails = self
            .failing
            .lock()
            .map(|f| f.iter().any(|p| uri.contains(p.as_str())))
            .unwrap_or(false);
        if fails {
            self.log.push(AudioEvent::Failed(uri.to_string()));
            return Err(SpellbeeError::Playback(format!("Cannot decode {}", uri)));
        }
        self.log.push(AudioEvent::Played(uri.to_string()));
        tokio::time::sleep(self.clip_length).await;
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Mock on-device speech: each utterance lasts a fixed duration.
pub struct RecordingSpeech {
    log: AudioLog,
    length: Duration,
}

impl RecordingSpeech {
    pub fn new(log: AudioLog, length: Duration) -> Self {
        Self { log, length }
    }
}

#[async_trait]
impl SpeechFallback for RecordingSpeech {
    async fn speak(&self, text: &str, rate: f32) {
        self.log.push(AudioEvent::Spoke(text.to_string(), rate));
        tokio::time::sleep(self.length).await;
    }

    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (AudioLog, Arc<RecordingPlayer>, Arc<AudioManager>) {
        let log = AudioLog::new();
        let player = Arc::new(RecordingPlayer::new(log.clone(), Duration::from_secs(2)));
        let speech = Arc::new(RecordingSpeech::new(log.clone(), Duration::from_secs(1)));
        let manager = Arc::new(AudioManager::new(player.clone(), speech));
        (log, player, manager)
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_stored_clip() {
        let (log, _, manager) = setup();
        let token = CancellationToken::new();
        let outcome = manager
            .play_or_speak(Some("memory://a.mp3"), "a", 1.0, &token)
            .await;
        assert_eq!(outcome, PlaybackOutcome::Played);
        assert_eq!(log.events(), vec![AudioEvent::Played("memory://a.mp3".to_string())]);
        assert!(!manager.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_clip_is_spoken() {
        let (log, _, manager) = setup();
        let token = CancellationToken::new();
        let outcome = manager.play_or_speak(None, "The word is: cat.", 0.9, &token).await;
        assert_eq!(outcome, PlaybackOutcome::Spoken);
        assert_eq!(
            log.events(),
            vec![AudioEvent::Spoke("The word is: cat.".to_string(), 0.9)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_clip_falls_back_to_speech() {
        let (log, player, manager) = setup();
        player.fail_on("broken");
        let token = CancellationToken::new();
        let outcome = manager
            .play_or_speak(Some("memory://broken.mp3"), "cat.", 1.0, &token)
            .await;
        assert_eq!(outcome, PlaybackOutcome::Spoken);
        assert_eq!(
            log.events(),
            vec![
                AudioEvent::Failed("memory://broken.mp3".to_string()),
                AudioEvent::Spoke("cat.".to_string(), 1.0),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_playback() {
        let (_, player, manager) = setup();
        let token = CancellationToken::new();

        let task = {
            let manager = manager.clone();
            let token = token.clone();
            tokio::spawn(async move {
                manager
                    .play_or_speak(Some("memory://long.mp3"), "x", 1.0, &token)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(manager.is_playing());
        token.cancel();

        assert_eq!(task.await.unwrap(), PlaybackOutcome::Cancelled);
        assert!(player.stop_count() >= 1);
        assert!(!manager.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_playback_preempts_current() {
        let (log, _, manager) = setup();
        let first = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .play_or_speak(Some("memory://first.mp3"), "1", 1.0, &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = manager
            .play_or_speak(Some("memory://second.mp3"), "2", 1.0, &CancellationToken::new())
            .await;

        assert_eq!(first.await.unwrap(), PlaybackOutcome::Cancelled);
        assert_eq!(second, PlaybackOutcome::Played);
        assert_eq!(log.played(), vec!["memory://first.mp3", "memory://second.mp3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_does_nothing() {
        let (log, _, manager) = setup();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(
            manager.speak("hello", 1.0, &token).await,
            PlaybackOutcome::Cancelled
        );
        assert!(log.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_activity_is_harmless() {
        let (_, player, manager) = setup();
        manager.stop();
        assert_eq!(player.stop_count(), 1);
        assert!(!manager.is_playing());
    }
}
