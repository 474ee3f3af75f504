//! The spelling test session.
//!
//! Every suspension (clip playback, inter-clip gap, countdown tick) is raced
//! against a cancellation token, and the session re-checks its phase under
//! the state lock after each one before doing anything else. Skipping and
//! cancelling therefore take effect at the next resume point, and no
//! playback or timer is started afterwards.
//!
//! Tokens form a tree under the session token:
//! - the dictation token is cancelled by `skip_to_checking`;
//! - each reveal or story playback gets a fresh activity token, cancelled
//!   by `stop_audio` or by the next activity.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use spellbee_audio::{AudioManager, PlaybackOutcome};
use spellbee_core::config::SessionSettings;
use spellbee_core::error::{Result, SpellbeeError};
use spellbee_core::score::{evaluate, Evaluation};
use spellbee_core::script;
use spellbee_core::types::{AssetKey, ClipKind, SpellingList};
use spellbee_storage::{PracticeLedger, SpellingRepository};

use crate::state::{SessionEvent, SessionPhase};

/// Clips played for each word during dictation, in order.
const ANNOUNCE_CLIPS: [ClipKind; 3] = [ClipKind::Word, ClipKind::Sentence, ClipKind::Repeat];

const TICK: Duration = Duration::from_secs(1);

/// How `run_dictation` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictationOutcome {
    /// Every word was read and the session is in Checking.
    Completed,
    /// The learner skipped ahead to Checking.
    Skipped,
    /// The session was cancelled.
    Cancelled,
}

/// Point-in-time view of a session for the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub phase: SessionPhase,
    pub current_index: usize,
    pub current_word: Option<String>,
    pub total_words: usize,
    /// Seconds left in the writing pause.
    pub time_left: u64,
    pub score: u32,
    /// Revealed word indices, ascending.
    pub revealed: Vec<usize>,
    pub cancelled: bool,
    pub story_playing: bool,
    pub celebrating: bool,
    pub evaluation: Option<Evaluation>,
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    current_index: usize,
    time_left: u64,
    score: u32,
    revealed: BTreeSet<usize>,
    story_playing: bool,
    celebrate_until: Option<Instant>,
    evaluation: Option<Evaluation>,
}

pub struct TestSession {
    id: Uuid,
    list: Arc<SpellingList>,
    audio: Arc<AudioManager>,
    ledger: Arc<PracticeLedger>,
    repo: SpellingRepository,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    session_token: CancellationToken,
    dictation_token: CancellationToken,
    activity: Mutex<CancellationToken>,
}

impl TestSession {
    pub fn new(
        list: Arc<SpellingList>,
        audio: Arc<AudioManager>,
        ledger: Arc<PracticeLedger>,
        repo: SpellingRepository,
        settings: SessionSettings,
    ) -> Self {
        let session_token = CancellationToken::new();
        let dictation_token = session_token.child_token();
        let activity = session_token.child_token();
        Self {
            id: Uuid::new_v4(),
            list,
            audio,
            ledger,
            repo,
            settings,
            state: Mutex::new(SessionState {
                phase: SessionPhase::Ready,
                current_index: 0,
                time_left: 0,
                score: 0,
                revealed: BTreeSet::new(),
                story_playing: false,
                celebrate_until: None,
                evaluation: None,
            }),
            session_token,
            dictation_token,
            activity: Mutex::new(activity),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn list(&self) -> &SpellingList {
        &self.list
    }

    pub fn phase(&self) -> SessionPhase {
        self.snapshot().phase
    }

    fn total_words(&self) -> u32 {
        self.list.words.len() as u32
    }

    // --- dictation ----------------------------------------------------------

    /// Read every word aloud with a writing pause after each.
    ///
    /// Runs from Ready until the list is exhausted (Checking), the learner
    /// skips, or the session is cancelled.
    pub async fn run_dictation(&self) -> Result<DictationOutcome> {
        self.fire(SessionEvent::Start)?;
        let total = self.list.words.len();
        info!(
            session_id = %self.id,
            group = %self.list.group,
            week_id = %self.list.week_id,
            words = total,
            "Dictation started"
        );

        if total == 0 {
            self.fire(SessionEvent::ListExhausted)?;
            return Ok(DictationOutcome::Completed);
        }

        for index in 0..total {
            {
                let mut state = self.state()?;
                if !self.dictating_in(&state, SessionPhase::Announcing) {
                    return Ok(self.interrupted());
                }
                state.current_index = index;
                state.time_left = 0;
            }

            if !self.announce(index).await {
                return Ok(self.interrupted());
            }

            {
                let mut state = self.state()?;
                if !self.dictating_in(&state, SessionPhase::Announcing) {
                    return Ok(self.interrupted());
                }
                self.transition(&mut state, SessionEvent::ClipsPlayed)?;
                state.time_left = self.settings.pause.as_secs();
            }

            if !self.count_down().await {
                return Ok(self.interrupted());
            }

            {
                let mut state = self.state()?;
                if !self.dictating_in(&state, SessionPhase::Writing) {
                    return Ok(self.interrupted());
                }
                let event = if index + 1 < total {
                    SessionEvent::PauseElapsed
                } else {
                    SessionEvent::ListExhausted
                };
                self.transition(&mut state, event)?;
            }
        }

        info!(session_id = %self.id, "Dictation complete");
        Ok(DictationOutcome::Completed)
    }

    /// Play the word, sentence and repeat clips for one word.
    async fn announce(&self, index: usize) -> bool {
        let word = &self.list.words[index];
        let sentence = self.list.sentence(word);

        for (i, kind) in ANNOUNCE_CLIPS.into_iter().enumerate() {
            if i > 0 && !sleep_unless_cancelled(self.settings.clip_gap, &self.dictation_token).await {
                return false;
            }
            if !self.still_in(SessionPhase::Announcing) {
                return false;
            }
            let text = script::utterance(kind, word, sentence);
            let outcome = self
                .audio
                .play_or_speak(
                    self.list.clip(kind, word),
                    &text,
                    self.settings.speech_rate,
                    &self.dictation_token,
                )
                .await;
            debug!(session_id = %self.id, word = %word, clip = ?kind, outcome = ?outcome, "Clip finished");
            if !self.still_in(SessionPhase::Announcing) {
                return false;
            }
        }
        true
    }

    /// Tick the writing pause down to zero, one second at a time.
    async fn count_down(&self) -> bool {
        loop {
            match self.state() {
                Ok(state) if state.time_left == 0 => return true,
                Ok(_) => {}
                Err(_) => return false,
            }

            if !sleep_unless_cancelled(TICK, &self.dictation_token).await {
                return false;
            }

            let Ok(mut state) = self.state() else {
                return false;
            };
            if !self.dictating_in(&state, SessionPhase::Writing) {
                return false;
            }
            state.time_left = state.time_left.saturating_sub(1);
        }
    }

    /// Jump to Checking from Announcing or Writing, stopping audio and the
    /// countdown.
    pub fn skip_to_checking(&self) -> Result<()> {
        self.ensure_live()?;
        {
            let mut state = self.state()?;
            self.transition(&mut state, SessionEvent::SkipToChecking)?;
            state.time_left = 0;
        }
        self.dictation_token.cancel();
        self.audio.stop();
        info!(session_id = %self.id, "Skipped to checking");
        Ok(())
    }

    /// Dispose of the session: no further playback or timers start.
    pub fn cancel(&self) {
        self.session_token.cancel();
        self.audio.stop();
        if let Ok(mut state) = self.state() {
            state.story_playing = false;
        }
        info!(session_id = %self.id, "Session cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.session_token.is_cancelled()
    }

    // --- checking -----------------------------------------------------------

    /// Reveal one word and play its spelling. Revealing again replays the
    /// audio without changing what is revealed.
    pub async fn reveal_word(&self, index: usize) -> Result<PlaybackOutcome> {
        self.ensure_live()?;
        let word = self.list.words.get(index).cloned().ok_or_else(|| {
            SpellbeeError::InvalidInput(format!(
                "No word at position {} (list has {})",
                index,
                self.list.words.len()
            ))
        })?;
        {
            let mut state = self.state()?;
            self.require(&state, SessionPhase::Checking, "reveal words")?;
            state.revealed.insert(index);
        }

        let token = self.begin_activity();
        Ok(self.play_spelling(&word, &token).await)
    }

    /// Reveal every word and play the spelling clips in list order.
    ///
    /// Returns `false` if stopped before the last clip finished.
    pub async fn reveal_all(&self) -> Result<bool> {
        self.ensure_live()?;
        {
            let mut state = self.state()?;
            self.require(&state, SessionPhase::Checking, "reveal words")?;
            state.revealed.extend(0..self.list.words.len());
        }

        let token = self.begin_activity();
        for (i, word) in self.list.words.iter().enumerate() {
            if i > 0 && !sleep_unless_cancelled(self.settings.reveal_gap, &token).await {
                return Ok(false);
            }
            let outcome = self.play_spelling(word, &token).await;
            if outcome == PlaybackOutcome::Cancelled || token.is_cancelled() {
                debug!(session_id = %self.id, stopped_at = i, "Reveal all stopped");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn play_spelling(&self, word: &str, token: &CancellationToken) -> PlaybackOutcome {
        self.audio
            .play_or_speak(
                self.list.clip(ClipKind::Spelling, word),
                &script::spelling(word),
                self.settings.speech_rate,
                token,
            )
            .await
    }

    /// Stop the current reveal or story playback. The session stays usable.
    pub fn stop_audio(&self) {
        self.activity_slot().cancel();
        self.audio.stop();
        if let Ok(mut state) = self.state() {
            state.story_playing = false;
        }
    }

    // --- scoring ------------------------------------------------------------

    pub fn enter_scoring(&self) -> Result<()> {
        self.fire(SessionEvent::EnterScore)?;
        self.stop_audio();
        Ok(())
    }

    /// Set the score, clamped to `[0, total words]`.
    pub fn set_score(&self, score: u32) -> Result<u32> {
        self.ensure_live()?;
        let mut state = self.state()?;
        self.require(&state, SessionPhase::Scoring, "change the score")?;
        state.score = score.min(self.total_words());
        Ok(state.score)
    }

    /// Nudge the score up or down, clamped to `[0, total words]`.
    pub fn adjust_score(&self, delta: i64) -> Result<u32> {
        self.ensure_live()?;
        let mut state = self.state()?;
        self.require(&state, SessionPhase::Scoring, "change the score")?;
        let adjusted = (state.score as i64 + delta).clamp(0, self.total_words() as i64);
        state.score = adjusted as u32;
        Ok(state.score)
    }

    /// Evaluate the score and move to Message, starting the celebration
    /// when earned.
    pub fn submit_score(&self) -> Result<Evaluation> {
        self.ensure_live()?;
        let mut state = self.state()?;
        self.transition(&mut state, SessionEvent::SubmitScore)?;

        let evaluation = evaluate(state.score, self.total_words());
        if evaluation.celebrate {
            state.celebrate_until = Some(Instant::now() + self.settings.celebration);
        }
        state.evaluation = Some(evaluation);
        info!(
            session_id = %self.id,
            score = state.score,
            total = self.total_words(),
            tier = %evaluation.tier,
            celebrate = evaluation.celebrate,
            "Score submitted"
        );
        Ok(evaluation)
    }

    // --- story --------------------------------------------------------------

    /// Play the story clip, or speak the story if there is no usable clip.
    /// Callable from Message (enters Story) or from Story (replays).
    pub async fn play_story(&self) -> Result<PlaybackOutcome> {
        self.ensure_live()?;
        {
            let mut state = self.state()?;
            if state.phase != SessionPhase::Story {
                self.transition(&mut state, SessionEvent::PlayStory)?;
            }
            state.story_playing = true;
        }

        let token = self.begin_activity();
        let outcome = self
            .audio
            .play_or_speak(
                self.list.asset(&AssetKey::Story),
                &self.list.story,
                self.settings.story_speech_rate,
                &token,
            )
            .await;

        if !token.is_cancelled() {
            if let Ok(mut state) = self.state() {
                state.story_playing = false;
            }
        }
        Ok(outcome)
    }

    /// Leave Message or Story for Naming.
    pub fn finish(&self) -> Result<()> {
        self.fire(SessionEvent::Finish)?;
        self.stop_audio();
        Ok(())
    }

    // --- naming -------------------------------------------------------------

    /// Record the attempt under `name` and end the session.
    ///
    /// A new name is added to the known children first. Neither write can
    /// fail the session: errors are logged and the session still completes.
    /// Returns the child's attempt count when the ledger write succeeded.
    pub async fn submit_name(&self, name: &str) -> Result<Option<u32>> {
        self.ensure_live()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SpellbeeError::InvalidInput(
                "Pick or type a name first".to_string(),
            ));
        }

        let score = {
            let mut state = self.state()?;
            self.transition(&mut state, SessionEvent::SubmitName)?;
            state.score
        };

        match self.repo.add_child(name).await {
            Ok(true) => info!(child = name, "New child added"),
            Ok(false) => {}
            Err(e) => warn!(child = name, error = %e, "Failed to save child name"),
        }

        let attempts = match self
            .ledger
            .record(
                &self.list.group,
                self.list.week_id,
                name,
                score,
                self.total_words(),
            )
            .await
        {
            Ok(attempts) => Some(attempts),
            Err(e) => {
                warn!(
                    session_id = %self.id,
                    child = name,
                    error = %e,
                    "Failed to log practice, session still complete"
                );
                None
            }
        };

        info!(session_id = %self.id, child = name, score, "Session complete");
        Ok(attempts)
    }

    // --- snapshot -----------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        SessionSnapshot {
            id: self.id,
            phase: state.phase,
            current_index: state.current_index,
            current_word: self.list.words.get(state.current_index).cloned(),
            total_words: self.list.words.len(),
            time_left: state.time_left,
            score: state.score,
            revealed: state.revealed.iter().copied().collect(),
            cancelled: self.session_token.is_cancelled(),
            story_playing: state.story_playing,
            celebrating: state
                .celebrate_until
                .is_some_and(|until| Instant::now() < until),
            evaluation: state.evaluation,
        }
    }

    // --- internals ----------------------------------------------------------

    fn state(&self) -> Result<MutexGuard<'_, SessionState>> {
        self.state
            .lock()
            .map_err(|e| SpellbeeError::Session(format!("Session state poisoned: {}", e)))
    }

    fn ensure_live(&self) -> Result<()> {
        if self.session_token.is_cancelled() {
            return Err(SpellbeeError::Session(
                "Session has been cancelled".to_string(),
            ));
        }
        Ok(())
    }

    fn require(&self, state: &SessionState, phase: SessionPhase, action: &str) -> Result<()> {
        if state.phase != phase {
            return Err(SpellbeeError::Session(format!(
                "Cannot {} in {}",
                action, state.phase
            )));
        }
        Ok(())
    }

    fn transition(&self, state: &mut SessionState, event: SessionEvent) -> Result<SessionPhase> {
        let next = state.phase.apply(event)?;
        debug!(session_id = %self.id, from = %state.phase, to = %next, event = %event, "Phase transition");
        state.phase = next;
        Ok(next)
    }

    fn fire(&self, event: SessionEvent) -> Result<SessionPhase> {
        self.ensure_live()?;
        let mut state = self.state()?;
        self.transition(&mut state, event)
    }

    /// Whether dictation may carry on in `phase`. Checked after every resume.
    fn dictating_in(&self, state: &SessionState, phase: SessionPhase) -> bool {
        !self.dictation_token.is_cancelled() && state.phase == phase
    }

    fn still_in(&self, phase: SessionPhase) -> bool {
        self.state()
            .map(|state| self.dictating_in(&state, phase))
            .unwrap_or(false)
    }

    fn interrupted(&self) -> DictationOutcome {
        if self.session_token.is_cancelled() {
            info!(session_id = %self.id, "Dictation cancelled");
            DictationOutcome::Cancelled
        } else {
            DictationOutcome::Skipped
        }
    }

    fn activity_slot(&self) -> MutexGuard<'_, CancellationToken> {
        match self.activity.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Cancel the previous reveal/story activity and start a new one.
    fn begin_activity(&self) -> CancellationToken {
        let token = self.session_token.child_token();
        let mut slot = self.activity_slot();
        slot.cancel();
        *slot = token.clone();
        token
    }
}

/// Sleep for `duration` unless `token` fires first. Returns `true` if the
/// full duration elapsed.
async fn sleep_unless_cancelled(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use spellbee_audio::{AudioEvent, AudioLog, RecordingPlayer, RecordingSpeech};
    use spellbee_core::clock::FixedClock;
    use spellbee_core::score::ScoreTier;
    use spellbee_core::week::WeekId;
    use spellbee_storage::MemoryKeyValueStore;

    struct Fixture {
        log: AudioLog,
        player: Arc<RecordingPlayer>,
        kv: Arc<MemoryKeyValueStore>,
        repo: SpellingRepository,
        ledger: Arc<PracticeLedger>,
        session: Arc<TestSession>,
    }

    fn week() -> WeekId {
        "2025-03-06".parse().unwrap()
    }

    fn uri(key: &AssetKey) -> String {
        format!("memory://{}", key)
    }

    fn make_list(words: &[&str], with_story: bool) -> SpellingList {
        let mut audio_assets = BTreeMap::new();
        let mut sentences = BTreeMap::new();
        for word in words {
            for kind in ClipKind::ALL {
                let key = AssetKey::clip(kind, *word);
                audio_assets.insert(key.clone(), uri(&key));
            }
            sentences.insert(word.to_string(), format!("A {} in a hat.", word));
        }
        if with_story {
            audio_assets.insert(AssetKey::Story, uri(&AssetKey::Story));
        }
        SpellingList {
            group: "OWLS".to_string(),
            week_id: week(),
            words: words.iter().map(|w| w.to_string()).collect(),
            sentences,
            story: "Once upon a time, a cat in a hat.".to_string(),
            audio_assets,
            created_at: Utc.with_ymd_and_hms(2025, 3, 6, 13, 0, 0).unwrap(),
        }
    }

    fn fixture_for(list: SpellingList) -> Fixture {
        let log = AudioLog::new();
        let player = Arc::new(RecordingPlayer::new(log.clone(), Duration::from_secs(1)));
        let speech = Arc::new(RecordingSpeech::new(log.clone(), Duration::from_secs(1)));
        let audio = Arc::new(AudioManager::new(player.clone(), speech));
        let kv = Arc::new(MemoryKeyValueStore::new());
        let repo = SpellingRepository::new(kv.clone());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 3, 7, 17, 0, 0).unwrap(),
        ));
        let ledger = Arc::new(PracticeLedger::new(repo.clone(), clock));
        let session = Arc::new(TestSession::new(
            Arc::new(list),
            audio,
            ledger.clone(),
            repo.clone(),
            SessionSettings::default(),
        ));
        Fixture {
            log,
            player,
            kv,
            repo,
            ledger,
            session,
        }
    }

    fn fixture(words: &[&str]) -> Fixture {
        fixture_for(make_list(words, true))
    }

    fn spawn_dictation(
        session: &Arc<TestSession>,
    ) -> tokio::task::JoinHandle<Result<DictationOutcome>> {
        let session = session.clone();
        tokio::spawn(async move { session.run_dictation().await })
    }

    /// Start dictation and skip straight to Checking.
    async fn at_checking(f: &Fixture) {
        let handle = spawn_dictation(&f.session);
        tokio::time::sleep(Duration::from_millis(100)).await;
        f.session.skip_to_checking().unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), DictationOutcome::Skipped);
        f.log.clear();
    }

    async fn at_naming(f: &Fixture, score: u32) {
        at_checking(f).await;
        f.session.enter_scoring().unwrap();
        f.session.set_score(score).unwrap();
        f.session.submit_score().unwrap();
        f.session.finish().unwrap();
    }

    fn clip_uri(kind: ClipKind, word: &str) -> String {
        uri(&AssetKey::clip(kind, word))
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_dictation_plays_clips_in_order() {
        let f = fixture(&["cat", "dog"]);
        let start = Instant::now();

        let outcome = f.session.run_dictation().await.unwrap();

        assert_eq!(outcome, DictationOutcome::Completed);
        assert_eq!(f.session.phase(), SessionPhase::Checking);
        let mut expected = Vec::new();
        for word in ["cat", "dog"] {
            for kind in ANNOUNCE_CLIPS {
                expected.push(clip_uri(kind, word));
            }
        }
        assert_eq!(f.log.played(), expected);

        // Per word: 3 x 1s clips, 2 x 500ms gaps, 10s pause.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(28), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(29), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_each_second() {
        let f = fixture(&["cat", "dog"]);
        let handle = spawn_dictation(&f.session);

        // Clips end at 4s; the pause then runs 4s..14s.
        tokio::time::sleep(Duration::from_millis(6500)).await;
        let snap = f.session.snapshot();
        assert_eq!(snap.phase, SessionPhase::Writing);
        assert_eq!(snap.time_left, 8);
        assert_eq!(snap.current_word.as_deref(), Some("cat"));

        tokio::time::sleep(Duration::from_secs(8)).await;
        let snap = f.session.snapshot();
        assert_eq!(snap.phase, SessionPhase::Announcing);
        assert_eq!(snap.current_index, 1);

        f.session.cancel();
        assert_eq!(handle.await.unwrap().unwrap(), DictationOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_writing_stops_within_a_tick() {
        let f = fixture(&["cat", "dog", "bee"]);
        let handle = spawn_dictation(&f.session);

        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(f.session.phase(), SessionPhase::Writing);

        let cancelled_at = Instant::now();
        f.session.cancel();
        assert_eq!(handle.await.unwrap().unwrap(), DictationOutcome::Cancelled);
        assert!(cancelled_at.elapsed() < TICK);

        // Nothing further is announced, even after the pause would have ended.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            f.log.played(),
            ANNOUNCE_CLIPS
                .into_iter()
                .map(|k| clip_uri(k, "cat"))
                .collect::<Vec<_>>()
        );
        let snap = f.session.snapshot();
        assert!(snap.cancelled);
        assert_eq!(snap.phase, SessionPhase::Writing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_announcing_stops_playback() {
        let f = fixture(&["cat", "dog"]);
        let handle = spawn_dictation(&f.session);

        tokio::time::sleep(Duration::from_millis(1700)).await;
        f.session.cancel();
        assert_eq!(handle.await.unwrap().unwrap(), DictationOutcome::Cancelled);
        assert_eq!(
            f.log.played(),
            vec![clip_uri(ClipKind::Word, "cat"), clip_uri(ClipKind::Sentence, "cat")]
        );
        assert!(f.player.stop_count() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_during_gap() {
        let f = fixture(&["cat", "dog"]);
        let handle = spawn_dictation(&f.session);

        // 1.0s..1.5s is the gap after the first clip.
        tokio::time::sleep(Duration::from_millis(1200)).await;
        f.session.skip_to_checking().unwrap();

        assert_eq!(handle.await.unwrap().unwrap(), DictationOutcome::Skipped);
        assert_eq!(f.session.phase(), SessionPhase::Checking);
        assert_eq!(f.log.played(), vec![clip_uri(ClipKind::Word, "cat")]);
        assert!(!f.session.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_during_writing() {
        let f = fixture(&["cat", "dog"]);
        let handle = spawn_dictation(&f.session);
        tokio::time::sleep(Duration::from_secs(5)).await;
        f.session.skip_to_checking().unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), DictationOutcome::Skipped);
        assert_eq!(f.session.snapshot().time_left, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_rejected_outside_dictation() {
        let f = fixture(&["cat"]);
        assert!(matches!(
            f.session.skip_to_checking(),
            Err(SpellbeeError::InvalidTransition { .. })
        ));
        at_checking(&f).await;
        assert!(f.session.skip_to_checking().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_twice_rejected() {
        let f = fixture(&["cat"]);
        at_checking(&f).await;
        assert!(f.session.run_dictation().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_list_goes_straight_to_checking() {
        let f = fixture(&[]);
        assert_eq!(
            f.session.run_dictation().await.unwrap(),
            DictationOutcome::Completed
        );
        assert_eq!(f.session.phase(), SessionPhase::Checking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_clip_is_spoken() {
        let mut list = make_list(&["cat"], true);
        list.audio_assets
            .remove(&AssetKey::clip(ClipKind::Sentence, "cat"));
        let f = fixture_for(list);

        f.session.run_dictation().await.unwrap();
        assert_eq!(
            f.log.events(),
            vec![
                AudioEvent::Played(clip_uri(ClipKind::Word, "cat")),
                AudioEvent::Spoke("A cat in a hat.".to_string(), 1.0),
                AudioEvent::Played(clip_uri(ClipKind::Repeat, "cat")),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_all_plays_in_list_order() {
        let f = fixture(&["cat", "dog", "bee", "owl"]);
        at_checking(&f).await;

        f.session.reveal_word(3).await.unwrap();
        f.session.reveal_word(1).await.unwrap();
        f.log.clear();

        assert!(f.session.reveal_all().await.unwrap());
        let expected: Vec<String> = ["cat", "dog", "bee", "owl"]
            .iter()
            .map(|w| clip_uri(ClipKind::Spelling, w))
            .collect();
        assert_eq!(f.log.played(), expected);
        assert_eq!(f.session.snapshot().revealed, vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_is_idempotent() {
        let f = fixture(&["cat", "dog"]);
        at_checking(&f).await;

        assert_eq!(
            f.session.reveal_word(1).await.unwrap(),
            PlaybackOutcome::Played
        );
        f.session.reveal_word(1).await.unwrap();
        assert_eq!(f.session.snapshot().revealed, vec![1]);
        assert_eq!(f.log.played().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reveal_guards() {
        let f = fixture(&["cat"]);
        assert!(f.session.reveal_word(0).await.is_err());
        at_checking(&f).await;
        assert!(matches!(
            f.session.reveal_word(5).await,
            Err(SpellbeeError::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_spelling_clip_falls_back() {
        let f = fixture(&["cat"]);
        at_checking(&f).await;
        f.player.fail_on("spelling_cat");
        assert_eq!(
            f.session.reveal_word(0).await.unwrap(),
            PlaybackOutcome::Spoken
        );
        assert_eq!(f.log.spoken(), vec!["cat is spelt: c, a, t. cat."]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_audio_halts_reveal_all() {
        let f = fixture(&["cat", "dog", "bee", "owl"]);
        at_checking(&f).await;

        let task = {
            let session = f.session.clone();
            tokio::spawn(async move { session.reveal_all().await })
        };
        tokio::time::sleep(Duration::from_millis(1500)).await;
        f.session.stop_audio();

        assert!(!task.await.unwrap().unwrap());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(f.log.played().len(), 2);
        assert_eq!(f.session.phase(), SessionPhase::Checking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_is_clamped() {
        let f = fixture(&["cat", "dog", "bee"]);
        at_checking(&f).await;
        assert!(f.session.set_score(1).is_err());

        f.session.enter_scoring().unwrap();
        assert_eq!(f.session.adjust_score(-1).unwrap(), 0);
        assert_eq!(f.session.set_score(99).unwrap(), 3);
        assert_eq!(f.session.adjust_score(1).unwrap(), 3);
        assert_eq!(f.session.adjust_score(-1).unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_celebration_lasts_four_seconds() {
        let f = fixture(&["cat", "dog"]);
        at_checking(&f).await;
        f.session.enter_scoring().unwrap();
        f.session.set_score(2).unwrap();

        let evaluation = f.session.submit_score().unwrap();
        assert_eq!(evaluation.tier, ScoreTier::Perfect);
        assert!(evaluation.celebrate);
        assert!(f.session.snapshot().celebrating);
        assert_eq!(f.session.phase(), SessionPhase::Message);

        tokio::time::sleep(Duration::from_millis(3900)).await;
        assert!(f.session.snapshot().celebrating);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!f.session.snapshot().celebrating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_score_does_not_celebrate() {
        let f = fixture(&["cat", "dog", "bee"]);
        at_checking(&f).await;
        f.session.enter_scoring().unwrap();
        f.session.set_score(1).unwrap();
        let evaluation = f.session.submit_score().unwrap();
        assert!(!evaluation.celebrate);
        assert!(!f.session.snapshot().celebrating);
        assert_eq!(f.session.snapshot().evaluation, Some(evaluation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_story_plays_clip_and_tracks_flag() {
        let f = fixture(&["cat"]);
        at_checking(&f).await;
        f.session.enter_scoring().unwrap();
        f.session.submit_score().unwrap();

        let task = {
            let session = f.session.clone();
            tokio::spawn(async move { session.play_story().await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(f.session.snapshot().story_playing);
        assert_eq!(f.session.phase(), SessionPhase::Story);

        assert_eq!(task.await.unwrap().unwrap(), PlaybackOutcome::Played);
        assert!(!f.session.snapshot().story_playing);
        assert_eq!(f.log.played(), vec![uri(&AssetKey::Story)]);

        // Replay from Story is allowed.
        f.session.play_story().await.unwrap();
        assert_eq!(f.log.played().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_story_without_clip_is_spoken_slowly() {
        let f = fixture_for(make_list(&["cat"], false));
        at_checking(&f).await;
        f.session.enter_scoring().unwrap();
        f.session.submit_score().unwrap();

        assert_eq!(
            f.session.play_story().await.unwrap(),
            PlaybackOutcome::Spoken
        );
        assert_eq!(
            f.log.events(),
            vec![AudioEvent::Spoke(
                "Once upon a time, a cat in a hat.".to_string(),
                0.9
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_name_logs_practice() {
        let f = fixture(&["cat", "dog"]);
        at_naming(&f, 1).await;

        assert!(matches!(
            f.session.submit_name("   ").await,
            Err(SpellbeeError::InvalidInput(_))
        ));
        assert_eq!(f.session.phase(), SessionPhase::Naming);

        assert_eq!(f.session.submit_name(" Ada ").await.unwrap(), Some(1));
        assert_eq!(f.session.phase(), SessionPhase::Done);
        assert_eq!(f.repo.children().await, vec!["Ada"]);
        assert_eq!(
            f.ledger
                .summary("OWLS", week())
                .await
                .unwrap()
                .attempts("Ada"),
            1
        );
        assert!(f.session.submit_name("Ada").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ledger_failure_does_not_fail_session() {
        let f = fixture(&["cat"]);
        at_naming(&f, 1).await;
        f.kv.set_fail_writes(true);

        assert_eq!(f.session.submit_name("Ben").await.unwrap(), None);
        assert_eq!(f.session.phase(), SessionPhase::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_session_rejects_actions() {
        let f = fixture(&["cat"]);
        at_checking(&f).await;
        f.session.cancel();

        assert!(matches!(
            f.session.reveal_all().await,
            Err(SpellbeeError::Session(_))
        ));
        assert!(f.session.enter_scoring().is_err());
        assert!(f.log.events().is_empty());
        assert!(f.session.snapshot().cancelled);
    }
}
