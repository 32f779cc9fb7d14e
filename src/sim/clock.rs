//! Wall-clock helpers: cadence inference, day filters, and time-of-day windows.
//!
//! Windows are half-open `[start, end)` on the local 24-hour clock. Boundaries
//! are stored as minutes after midnight in `0..=1440`, so `"24:00"` keeps its
//! meaning as "end of day" instead of collapsing into `"00:00"`:
//!
//! ```
//! use meter_scenario::sim::clock::TimeWindow;
//!
//! let evening = TimeWindow::parse("18:00", "24:00").unwrap();
//! assert!(!evening.wraps_midnight());
//! assert_eq!(evening.duration_hours(), 6.0);
//!
//! let overnight = TimeWindow::parse("22:00", "06:00").unwrap();
//! assert!(overnight.wraps_midnight());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// A boundary on the local 24-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    pub const MIDNIGHT: Self = Self(0);
    /// `"24:00"`: closes a window at the end of the day.
    pub const END_OF_DAY: Self = Self(MINUTES_PER_DAY);

    /// Minutes after midnight.
    ///
    /// Values past 1440 are clamped to `"24:00"` in release builds and panic
    /// in debug builds.
    pub const fn from_minutes(minutes: u32) -> Self {
        debug_assert!(minutes <= MINUTES_PER_DAY, "minute of day out of range");
        if minutes > MINUTES_PER_DAY {
            Self(MINUTES_PER_DAY)
        } else {
            Self(minutes)
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidTime`] when out of range.
    pub fn from_hm(hour: u32, minute: u32) -> Result<Self> {
        if minute > 59 || hour > 24 || (hour == 24 && minute != 0) {
            return Err(Error::InvalidTime(format!("{hour:02}:{minute:02}")));
        }
        Ok(Self(hour * 60 + minute))
    }

    /// Parses `"HH:MM"` (one- or two-digit hour, two-digit minute).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTime`] on anything else; there is no fallback.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(h) || h.len() > 2 || !digits(m) || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        Self::from_hm(hour, minute).map_err(|_| invalid())
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn is_end_of_day(self) -> bool {
        self.0 == MINUTES_PER_DAY
    }

    /// The wall-clock instant; `"24:00"` and `"00:00"` both give midnight.
    pub fn wall_clock(self) -> NaiveTime {
        let m = self.0 % MINUTES_PER_DAY;
        NaiveTime::from_hms_opt(m / 60, m % 60, 0).unwrap_or_default()
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A half-open `[start, end)` window on the local clock.
///
/// When `start >= end` the window wraps past midnight, so `22:00 → 06:00`
/// covers the night and `00:00 → 00:00` covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeWindow {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidTime`] if either boundary is malformed.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self::new(TimeOfDay::parse(start)?, TimeOfDay::parse(end)?))
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start >= self.end
    }

    /// Containment test on seconds after local midnight.
    pub fn contains_seconds(&self, seconds: u32) -> bool {
        let start = self.start.minutes() * 60;
        let end = self.end.minutes() * 60;
        if start < end {
            seconds >= start && seconds < end
        } else {
            seconds >= start || seconds < end
        }
    }

    /// Whether the local wall-clock time of `ts` falls inside the window.
    pub fn contains(&self, ts: &DateTime<Tz>) -> bool {
        self.contains_seconds(ts.num_seconds_from_midnight())
    }

    pub fn duration_hours(&self) -> f64 {
        let start = self.start.minutes();
        let end = self.end.minutes();
        let minutes = if start < end {
            end - start
        } else {
            MINUTES_PER_DAY - start + end
        };
        f64::from(minutes) / 60.0
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Which days of the week a window applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayFilter {
    #[default]
    #[serde(rename = "ALL", alias = "all")]
    All,
    /// Monday to Friday.
    #[serde(rename = "MF", alias = "weekdays")]
    Weekdays,
    /// Monday to Saturday.
    #[serde(rename = "MS", alias = "weekdays_saturday")]
    WeekdaysSaturday,
}

impl DayFilter {
    pub fn matches_weekday(self, weekday: Weekday) -> bool {
        match self {
            DayFilter::All => true,
            DayFilter::Weekdays => weekday.num_days_from_monday() <= 4,
            DayFilter::WeekdaysSaturday => weekday.num_days_from_monday() <= 5,
        }
    }

    /// Tests the local calendar day of `ts`.
    pub fn matches(self, ts: &DateTime<Tz>) -> bool {
        self.matches_weekday(ts.weekday())
    }
}

impl FromStr for DayFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "ALL" | "all" => Ok(DayFilter::All),
            "MF" | "weekdays" => Ok(DayFilter::Weekdays),
            "MS" | "weekdays_saturday" => Ok(DayFilter::WeekdaysSaturday),
            other => Err(Error::UnknownDayFilter(other.to_string())),
        }
    }
}

/// Most frequent gap between consecutive distinct timestamps, in whole minutes.
///
/// Gaps are rounded to the nearest minute; ties go to the shorter gap.
/// Returns `default_minutes` when fewer than two distinct timestamps exist or
/// no gap rounds to at least one minute.
pub fn infer_cadence(timestamps: &[DateTime<Tz>], default_minutes: u32) -> u32 {
    let mut sorted = timestamps.to_vec();
    sorted.sort();
    sorted.dedup();
    if sorted.len() < 2 {
        return default_minutes;
    }

    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for pair in sorted.windows(2) {
        let gap_minutes = (pair[1] - pair[0]).num_milliseconds() as f64 / 60_000.0;
        let rounded = gap_minutes.round() as i64;
        if rounded >= 1 {
            *counts.entry(rounded).or_insert(0) += 1;
        }
    }

    let mut best: Option<(i64, usize)> = None;
    for (&gap, &count) in &counts {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((gap, count));
        }
    }
    best.and_then(|(gap, _)| u32::try_from(gap).ok())
        .unwrap_or(default_minutes)
}
