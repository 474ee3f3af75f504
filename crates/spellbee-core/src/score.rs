//! Score evaluation: maps a self-marked score to an encouragement tier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ratio at or above which a score is celebrated.
pub const CELEBRATION_THRESHOLD: f64 = 0.7;

/// Encouragement tier, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTier {
    Perfect,
    Brilliant,
    Good,
    Mid,
    Encouragement,
    Base,
}

impl ScoreTier {
    pub fn message(&self) -> &'static str {
        match self {
            ScoreTier::Perfect => "PERFECT SCORE! 🌟 You absolute legend! Every single word spot-on!",
            ScoreTier::Brilliant => "Brilliant work! 🌟 You're smashing it — nearly perfect!",
            ScoreTier::Good => "Really well done! 💪 That's a cracking effort!",
            ScoreTier::Mid => "Good going! 🙌 You're getting there — keep practising!",
            ScoreTier::Encouragement => "Nice try! 🌈 Every bit of practice makes you better!",
            ScoreTier::Base => {
                "Great effort having a go! 🐝 Keep buzzing away — practice makes perfect!"
            }
        }
    }
}

impl fmt::Display for ScoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScoreTier::Perfect => "perfect",
            ScoreTier::Brilliant => "brilliant",
            ScoreTier::Good => "good",
            ScoreTier::Mid => "mid",
            ScoreTier::Encouragement => "encouragement",
            ScoreTier::Base => "base",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of evaluating a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub tier: ScoreTier,
    pub message: &'static str,
    pub celebrate: bool,
}

/// Evaluate `score` out of `total`.
///
/// Tiers are checked top-down and the first match wins. A zero total has no
/// meaningful ratio and yields the base tier without celebration.
pub fn evaluate(score: u32, total: u32) -> Evaluation {
    if total == 0 {
        return Evaluation {
            tier: ScoreTier::Base,
            message: ScoreTier::Base.message(),
            celebrate: false,
        };
    }

    let score = score.min(total);
    let ratio = score as f64 / total as f64;

    let tier = if score == total {
        ScoreTier::Perfect
    } else if ratio >= 0.9 {
        ScoreTier::Brilliant
    } else if ratio >= 0.7 {
        ScoreTier::Good
    } else if ratio >= 0.5 {
        ScoreTier::Mid
    } else if ratio >= 0.3 {
        ScoreTier::Encouragement
    } else {
        ScoreTier::Base
    };

    Evaluation {
        tier,
        message: tier.message(),
        celebrate: ratio >= CELEBRATION_THRESHOLD,
    }
}
