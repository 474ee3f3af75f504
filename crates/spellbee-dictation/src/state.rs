//! Test session phases and the transition table.
//!
//! - Ready -> Announcing (start)
//! - Announcing -> Writing (clips played)
//! - Writing -> Announcing (pause elapsed, words remain)
//! - Announcing | Writing -> Checking (list exhausted, or skip)
//! - Checking -> Scoring -> Message
//! - Message -> Story (optional) -> Naming, or Message -> Naming
//! - Naming -> Done (name submitted)

use std::fmt;

use spellbee_core::error::{Result, SpellbeeError};

/// Phase of a test session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// Created, not started.
    Ready,
    /// Playing the current word's clips.
    Announcing,
    /// Counting down the writing pause.
    Writing,
    /// Learner checks their answers; words can be revealed.
    Checking,
    /// Learner enters their score.
    Scoring,
    /// Encouragement message (and maybe a celebration).
    Message,
    /// Story replay.
    Story,
    /// Learner picks their name.
    Naming,
    /// Attempt logged; the session is over.
    Done,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Ready => "Ready",
            SessionPhase::Announcing => "Announcing",
            SessionPhase::Writing => "Writing",
            SessionPhase::Checking => "Checking",
            SessionPhase::Scoring => "Scoring",
            SessionPhase::Message => "Message",
            SessionPhase::Story => "Story",
            SessionPhase::Naming => "Naming",
            SessionPhase::Done => "Done",
        };
        write!(f, "{}", s)
    }
}

/// Something that moves a session between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    Start,
    ClipsPlayed,
    PauseElapsed,
    ListExhausted,
    SkipToChecking,
    EnterScore,
    SubmitScore,
    PlayStory,
    Finish,
    SubmitName,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl SessionPhase {
    /// The phase `event` leads to from `self`, if allowed.
    pub fn next(self, event: SessionEvent) -> Option<SessionPhase> {
        use SessionEvent as E;
        use SessionPhase as P;

        match (self, event) {
            (P::Ready, E::Start) => Some(P::Announcing),
            (P::Announcing, E::ClipsPlayed) => Some(P::Writing),
            (P::Writing, E::PauseElapsed) => Some(P::Announcing),
            (P::Announcing | P::Writing, E::ListExhausted | E::SkipToChecking) => {
                Some(P::Checking)
            }
            (P::Checking, E::EnterScore) => Some(P::Scoring),
            (P::Scoring, E::SubmitScore) => Some(P::Message),
            (P::Message, E::PlayStory) => Some(P::Story),
            (P::Message | P::Story, E::Finish) => Some(P::Naming),
            (P::Naming, E::SubmitName) => Some(P::Done),
            (
                P::Ready
                | P::Announcing
                | P::Writing
                | P::Checking
                | P::Scoring
                | P::Message
                | P::Story
                | P::Naming
                | P::Done,
                _,
            ) => None,
        }
    }

    /// Like [`next`](Self::next), but an invalid pair is an error.
    pub fn apply(self, event: SessionEvent) -> Result<SessionPhase> {
        self.next(event)
            .ok_or_else(|| SpellbeeError::InvalidTransition {
                from: self.to_string(),
                event: event.to_string(),
            })
    }

    /// Phases during which dictation audio and the countdown run.
    pub fn is_dictating(&self) -> bool {
        matches!(self, SessionPhase::Announcing | SessionPhase::Writing)
    }
}

// =============================================================================
// Tests
// =============================================================================
