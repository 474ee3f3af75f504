//! Spellbee core crate - shared error type, configuration, domain types,
//! the spelling-week clock and the score evaluator.

pub mod clock;
pub mod config;
pub mod error;
pub mod score;
pub mod script;
pub mod types;
pub mod week;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{SessionSettings, SpellbeeConfig};
pub use error::{Result, SpellbeeError};
pub use score::{evaluate, Evaluation, ScoreTier};
pub use types::*;
pub use week::{ReferenceZone, WeekClock, WeekId, WeekWindow};
