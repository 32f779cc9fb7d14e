use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::devices::types::IntervalProfile;
use crate::error::{Error, Result};
use crate::sim::clock::{DayFilter, TimeOfDay, TimeWindow};

/// Remaining need below this is treated as met.
const NEED_EPSILON_KWH: f64 = 1e-9;

/// How a day's energy target is spread over its eligible intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvStrategy {
    /// Charge at the power cap from the start of the window until the target is met.
    #[default]
    Immediate,
    /// Split the target evenly over every eligible interval.
    Scheduled,
}

impl FromStr for EvStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(EvStrategy::Immediate),
            "scheduled" => Ok(EvStrategy::Scheduled),
            _ => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for EvStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvStrategy::Immediate => write!(f, "immediate"),
            EvStrategy::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Household EV charging demand.
///
/// Each local calendar day the charger tries to deliver `daily_kwh`, never
/// more than `max_kw` in any interval, and only in intervals whose wall-clock
/// time falls inside `[window_start, window_end)` on a day accepted by `days`.
/// The window may wrap past midnight (the default is 18:00 → 07:00).
///
/// # Power Flow Convention
/// Output is always load: non-negative kWh added to grid import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvConfig {
    /// Energy target per local calendar day (kWh).
    pub daily_kwh: f64,
    /// Charger power limit (kW).
    pub max_kw: f64,
    pub window_start: TimeOfDay,
    pub window_end: TimeOfDay,
    pub days: DayFilter,
    pub strategy: EvStrategy,
}

impl Default for EvConfig {
    fn default() -> Self {
        Self {
            daily_kwh: 7.0,
            max_kw: 7.0,
            window_start: TimeOfDay::from_minutes(18 * 60),
            window_end: TimeOfDay::from_minutes(7 * 60),
            days: DayFilter::All,
            strategy: EvStrategy::Immediate,
        }
    }
}

impl EvConfig {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.window_start, self.window_end)
    }

    /// A non-positive target or power limit means "no EV".
    pub fn is_enabled(&self) -> bool {
        self.daily_kwh > 0.0 && self.max_kw > 0.0
    }

    /// Whether an interval starting at `ts` may carry charging.
    pub fn is_eligible(&self, ts: &DateTime<Tz>) -> bool {
        self.days.matches(ts) && self.window().contains(ts)
    }

    pub fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if !self.daily_kwh.is_finite() {
            errors.push(ConfigError::new(format!("{prefix}.daily_kwh"), "must be finite"));
        }
        if !self.max_kw.is_finite() {
            errors.push(ConfigError::new(format!("{prefix}.max_kw"), "must be finite"));
        }
        errors
    }

    /// Allocates charging energy per interval.
    ///
    /// Days are local calendar dates; with a wrapping window, the early-morning
    /// intervals belong to the day they fall on, not to the previous evening.
    ///
    /// # Arguments
    ///
    /// * `index` - Interval start times, chronological
    /// * `interval_hours` - Duration of one interval in hours
    ///
    /// # Returns
    ///
    /// kWh per interval, zero for every ineligible interval
    pub fn allocate(&self, index: &[DateTime<Tz>], interval_hours: f64) -> Vec<f64> {
        let mut out = vec![0.0; index.len()];
        if !self.is_enabled() || interval_hours <= 0.0 {
            return out;
        }
        let cap_kwh = self.max_kw * interval_hours;

        let mut eligible_by_day: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        for (i, ts) in index.iter().enumerate() {
            if self.is_eligible(ts) {
                eligible_by_day.entry(ts.date_naive()).or_default().push(i);
            }
        }

        for slots in eligible_by_day.values() {
            match self.strategy {
                EvStrategy::Immediate => {
                    let mut need = self.daily_kwh;
                    for &i in slots {
                        if need <= NEED_EPSILON_KWH {
                            break;
                        }
                        let e = cap_kwh.min(need);
                        out[i] = e;
                        need -= e;
                    }
                }
                EvStrategy::Scheduled => {
                    let per_interval = cap_kwh.min(self.daily_kwh / slots.len() as f64);
                    for &i in slots {
                        out[i] = per_interval;
                    }
                }
            }
        }

        out
    }
}

impl IntervalProfile for EvConfig {
    fn energy_kwh(&self, index: &[DateTime<Tz>], interval_hours: f64) -> Result<Vec<f64>> {
        Ok(self.allocate(index, interval_hours))
    }

    fn device_type(&self) -> &'static str {
        "EvCharger"
    }
}
