//! Spellbee Dictation crate - the timed, cancellable spelling test.
//!
//! A `TestSession` reads each word of a `SpellingList` aloud, pauses for
//! writing, then walks the learner through checking, scoring, an optional
//! story replay and naming, after which the attempt is logged to the
//! practice ledger. Phases follow a strict transition table:
//! Ready -> Announcing <-> Writing -> Checking -> Scoring -> Message
//! -> (Story) -> Naming -> Done.

pub mod session;
pub mod state;

pub use session::{DictationOutcome, SessionSnapshot, TestSession};
pub use state::{SessionEvent, SessionPhase};
