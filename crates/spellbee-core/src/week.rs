//! Spelling-week clock.
//!
//! A spelling week runs from Thursday 12:00 to the following Thursday 12:00
//! in a fixed reference time zone (UK time by default). The Thursday that
//! opens the window is the week identifier, formatted `YYYY-MM-DD`. Every
//! cached list and practice record is keyed by it.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike,
    Utc, Weekday,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpellbeeError};

/// Hour (local) at which a new spelling week opens on Thursday.
pub const WEEK_OPENS_AT_HOUR: u32 = 12;

// =============================================================================
// Reference zone
// =============================================================================

/// Time zone in which the Thursday-noon boundary is evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReferenceZone {
    /// UK civil time: GMT, or BST (+1h) from the last Sunday of March 01:00 UTC
    /// until the last Sunday of October 01:00 UTC.
    #[default]
    EuropeLondon,
    Utc,
    Fixed(FixedOffset),
}

impl ReferenceZone {
    /// Convert an instant to local wall-clock time in this zone.
    pub fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        let utc = instant.naive_utc();
        match self {
            ReferenceZone::Utc => utc,
            ReferenceZone::Fixed(offset) => utc + Duration::seconds(offset.local_minus_utc() as i64),
            ReferenceZone::EuropeLondon => {
                if is_british_summer_time(utc) {
                    utc + Duration::hours(1)
                } else {
                    utc
                }
            }
        }
    }
}

impl fmt::Display for ReferenceZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceZone::EuropeLondon => write!(f, "Europe/London"),
            ReferenceZone::Utc => write!(f, "UTC"),
            ReferenceZone::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}

impl FromStr for ReferenceZone {
    type Err = SpellbeeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Europe/London" | "europe/london" => Ok(ReferenceZone::EuropeLondon),
            "UTC" | "utc" | "Z" => Ok(ReferenceZone::Utc),
            other => other
                .parse::<FixedOffset>()
                .map(ReferenceZone::Fixed)
                .map_err(|_| SpellbeeError::Config(format!("Unknown reference zone: {}", other))),
        }
    }
}

/// Whether a UTC wall time falls inside British Summer Time.
fn is_british_summer_time(utc: NaiveDateTime) -> bool {
    let year = utc.year();
    let one_am = NaiveTime::from_hms_opt(1, 0, 0).unwrap_or_default();
    let starts = last_sunday(year, 3).and_time(one_am);
    let ends = last_sunday(year, 10).and_time(one_am);
    utc >= starts && utc < ends
}

fn last_sunday(year: i32, month: u32) -> NaiveDate {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .unwrap_or_default();
    let last = first_of_next.pred_opt().unwrap_or(first_of_next);
    let back = last.weekday().num_days_from_sunday() as i64;
    last - Duration::days(back)
}

// =============================================================================
// Week identifier
// =============================================================================

/// Identifier of a spelling week: the opening Thursday as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekId(NaiveDate);

impl WeekId {
    /// Build a week id from its opening Thursday.
    pub fn from_thursday(date: NaiveDate) -> Result<Self> {
        if date.weekday() != Weekday::Thu {
            return Err(SpellbeeError::InvalidInput(format!(
                "Week id must be a Thursday, got {} ({})",
                date,
                date.weekday()
            )));
        }
        Ok(Self(date))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Human-readable label, e.g. "Spellings released on Thursday 5th March".
    pub fn release_label(&self) -> String {
        let day = self.0.day();
        format!(
            "Spellings released on Thursday {}{} {}",
            day,
            ordinal_suffix(day),
            self.0.format("%B")
        )
    }
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for WeekId {
    type Err = SpellbeeError;

    fn from_str(s: &str) -> Result<Self> {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|e| SpellbeeError::InvalidInput(format!("Bad week id '{}': {}", s, e)))?;
        Self::from_thursday(date)
    }
}

impl TryFrom<String> for WeekId {
    type Error = SpellbeeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<WeekId> for String {
    fn from(id: WeekId) -> Self {
        id.to_string()
    }
}

// =============================================================================
// Window + clock
// =============================================================================

/// The `[start, end)` local interval a week id covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    pub week_id: WeekId,
    /// Opening Thursday 12:00, local reference time.
    pub start: NaiveDateTime,
    /// Following Thursday 12:00, local reference time (exclusive).
    pub end: NaiveDateTime,
    pub zone: ReferenceZone,
}

impl WeekWindow {
    /// Whether a local reference time lies inside this window.
    pub fn contains_local(&self, local: NaiveDateTime) -> bool {
        local >= self.start && local < self.end
    }

    /// Whether an instant lies inside this window.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.contains_local(self.zone.to_local(now))
    }
}

/// Maps instants to spelling weeks. Pure: holds only the reference zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeekClock {
    zone: ReferenceZone,
}

impl WeekClock {
    pub fn new(zone: ReferenceZone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> ReferenceZone {
        self.zone
    }

    /// The week id for `now`.
    pub fn week_id(&self, now: DateTime<Utc>) -> WeekId {
        let local = self.zone.to_local(now);
        let weekday = local.weekday().num_days_from_sunday() as i64;
        let thursday = Weekday::Thu.num_days_from_sunday() as i64;

        let mut days_back = (weekday - thursday).rem_euclid(7);
        if days_back == 0 && local.hour() < WEEK_OPENS_AT_HOUR {
            // Thursday morning still belongs to last week's window.
            days_back = 7;
        }

        WeekId(local.date() - Duration::days(days_back))
    }

    /// The full window containing `now`.
    pub fn window(&self, now: DateTime<Utc>) -> WeekWindow {
        let week_id = self.week_id(now);
        let noon = NaiveTime::from_hms_opt(WEEK_OPENS_AT_HOUR, 0, 0).unwrap_or_default();
        let start = week_id.date().and_time(noon);
        WeekWindow {
            week_id,
            start,
            end: start + Duration::days(7),
            zone: self.zone,
        }
    }

    /// Whether `week_id` is the week current at `now`.
    pub fn is_current(&self, week_id: WeekId, now: DateTime<Utc>) -> bool {
        self.week_id(now) == week_id
    }
}
