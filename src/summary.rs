//! Usage summaries: totals, peaks, the average-day profile and the window,
//! base-load and top-hour statistics derived from it, plus daily, monthly and
//! seasonal energy rollups.
//!
//! Every statistic is computed from an explicit [`SummaryOptions`], so the
//! same series and options always give the same payload.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::canon::{CanonicalSeries, DEFAULT_CADENCE_MIN, Flow};
use crate::config::ConfigError;
use crate::sim::clock::{TimeOfDay, TimeWindow, infer_cadence};

/// A named time-of-day window reported in [`SummaryStats::windows`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedWindow {
    pub key: String,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl NamedWindow {
    pub fn new(key: &str, start: TimeOfDay, end: TimeOfDay) -> Self {
        Self {
            key: key.to_string(),
            start,
            end,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

/// Which half of the globe the meter sits in; decides the season of a month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hemisphere {
    #[default]
    Southern,
    Northern,
}

/// Meteorological season: three whole calendar months each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Summer,
    Autumn,
    Winter,
    Spring,
}

impl Season {
    /// Season of a calendar month (1-based).
    ///
    /// Southern: Dec–Feb summer, Mar–May autumn, Jun–Aug winter, Sep–Nov
    /// spring. Northern is shifted by half a year.
    pub fn of_month(month: u32, hemisphere: Hemisphere) -> Self {
        let southern = match month {
            12 | 1 | 2 => Season::Summer,
            3..=5 => Season::Autumn,
            6..=8 => Season::Winter,
            _ => Season::Spring,
        };
        match hemisphere {
            Hemisphere::Southern => southern,
            Hemisphere::Northern => match southern {
                Season::Summer => Season::Winter,
                Season::Autumn => Season::Spring,
                Season::Winter => Season::Summer,
                Season::Spring => Season::Autumn,
            },
        }
    }
}

/// What a summary reports on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SummaryOptions {
    pub windows: Vec<NamedWindow>,
    /// How many of the heaviest clock hours to list.
    pub top_n: usize,
    pub hemisphere: Hemisphere,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        let at = |h: u32| TimeOfDay::from_minutes(h * 60);
        Self {
            windows: vec![
                NamedWindow::new("overnight", at(0), at(5)),
                NamedWindow::new("morning", at(5), at(9)),
                NamedWindow::new("daytime", at(9), at(17)),
                NamedWindow::new("evening", at(17), at(24)),
            ],
            top_n: 4,
            hemisphere: Hemisphere::Southern,
        }
    }
}

impl SummaryOptions {
    pub fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut seen = BTreeSet::new();
        for (i, w) in self.windows.iter().enumerate() {
            if w.key.trim().is_empty() {
                errors.push(ConfigError::new(
                    format!("{prefix}.windows[{i}].key"),
                    "must not be empty",
                ));
            } else if !seen.insert(w.key.as_str()) {
                errors.push(ConfigError::new(
                    format!("{prefix}.windows[{i}].key"),
                    format!("duplicate window key \"{}\"", w.key),
                ));
            }
        }
        if self.top_n > 24 {
            errors.push(ConfigError::new(format!("{prefix}.top_n"), "must be <= 24"));
        }
        errors
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryMeta {
    /// Distinct meter identifiers.
    pub meters: usize,
    pub start: Option<DateTime<Tz>>,
    pub end: Option<DateTime<Tz>>,
    pub cadence_min: u32,
    /// Calendar span, inclusive of both ends.
    pub days: i64,
    pub channels: Vec<String>,
    pub flows: Vec<Flow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryPeaks {
    pub max_interval_kwh: f64,
    pub max_interval_time: Option<DateTime<Tz>>,
}

/// One `HH:MM` slot of the average day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSlot {
    pub slot: String,
    /// Average kWh per day in this slot, by flow.
    pub flows: BTreeMap<Flow, f64>,
    /// Sum of the import flows.
    pub import_total: f64,
    #[serde(skip)]
    seconds: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BaseLoadStat {
    pub base_kw: f64,
    pub base_kwh_per_day: f64,
    pub share_of_daily_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WindowStat {
    pub avg_kw: f64,
    pub kwh_per_day: f64,
    pub share_of_daily_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopHours {
    /// `HH:00` labels, heaviest first.
    pub hours: Vec<String>,
    pub kwh_total: f64,
    pub share_of_daily_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_import_kwh: f64,
    pub solar_export_kwh: f64,
    pub per_day_avg_kwh: f64,
    pub peak_consumption_kw: f64,
    pub peak_time: Option<String>,
    pub peaks: SummaryPeaks,
    pub base: BaseLoadStat,
    pub windows: BTreeMap<String, WindowStat>,
    pub top_hours: TopHours,
}

/// Energy over one calendar period (a local date or a `YYYY-MM` month).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodUsage {
    pub period: String,
    /// kWh by flow.
    pub flows: BTreeMap<Flow, f64>,
    pub import_kwh: f64,
    pub export_kwh: f64,
    /// Heaviest single import interval.
    pub peak_interval_kwh: f64,
    /// Mean kWh per import interval present in the period.
    pub average_interval_kwh: f64,
}

/// Energy over one season of one calendar year.
///
/// The year is the calendar year of the months themselves, so December and
/// the following January and February land in different rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonUsage {
    pub season: Season,
    pub year: i32,
    pub flows: BTreeMap<Flow, f64>,
    pub import_kwh: f64,
    pub export_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryPayload {
    pub meta: SummaryMeta,
    pub stats: SummaryStats,
    pub profile: Vec<ProfileSlot>,
    pub days: Vec<PeriodUsage>,
    pub months: Vec<PeriodUsage>,
    pub seasons: Vec<SeasonUsage>,
}

/// Summarises a canonical series.
///
/// The average-day profile divides each slot's energy by the number of
/// distinct local dates in the series, so sparse series (zero intervals
/// omitted) and dense ones give the same profile.
pub fn summarise(series: &CanonicalSeries, options: &SummaryOptions) -> SummaryPayload {
    let timestamps = series.timestamps();
    let start = timestamps.first().copied();
    let end = timestamps.last().copied();
    let days = match (start, end) {
        (Some(s), Some(e)) => (e - s).num_days() + 1,
        _ => 0,
    };
    let cadence_min = infer_cadence(&timestamps, DEFAULT_CADENCE_MIN);
    let kw_factor = 60.0 / f64::from(cadence_min);

    let meta = SummaryMeta {
        meters: series.meter_ids().len(),
        start,
        end,
        cadence_min,
        days,
        channels: series.channels().into_iter().map(str::to_string).collect(),
        flows: series.flows(),
    };

    let total_import_kwh = series.import_kwh();
    let solar_export_kwh = series.export_kwh();
    let per_day_avg_kwh = if days > 0 {
        total_import_kwh / days as f64
    } else {
        0.0
    };

    let mut peaks = SummaryPeaks {
        max_interval_kwh: 0.0,
        max_interval_time: None,
    };
    for r in series.records() {
        if peaks.max_interval_time.is_none() || r.energy_kwh > peaks.max_interval_kwh {
            peaks.max_interval_kwh = r.energy_kwh;
            peaks.max_interval_time = Some(r.timestamp);
        }
    }

    let profile = average_day_profile(series);
    let total_daily_kwh: f64 = profile.iter().map(|p| p.import_total).sum();
    let share = |kwh: f64| {
        if total_daily_kwh > 0.0 {
            kwh / total_daily_kwh * 100.0
        } else {
            0.0
        }
    };

    let (peak_consumption_kw, peak_time) = profile
        .iter()
        .fold(None::<&ProfileSlot>, |best, p| match best {
            Some(b) if b.import_total >= p.import_total => Some(b),
            _ => Some(p),
        })
        .map_or((0.0, None), |p| {
            (p.import_total * kw_factor, Some(p.slot.clone()))
        });

    let base = profile
        .iter()
        .map(|p| p.import_total)
        .reduce(f64::min)
        .map_or_else(BaseLoadStat::default, |min_slot_kwh| {
            let base_kw = min_slot_kwh * kw_factor;
            let base_kwh_per_day = base_kw * 24.0;
            BaseLoadStat {
                base_kw,
                base_kwh_per_day,
                share_of_daily_pct: share(base_kwh_per_day),
            }
        });

    let windows = options
        .windows
        .iter()
        .map(|w| {
            let window = w.window();
            let kwh_per_day: f64 = profile
                .iter()
                .filter(|p| window.contains_seconds(p.seconds))
                .map(|p| p.import_total)
                .sum();
            let hours = window.duration_hours();
            let stat = WindowStat {
                avg_kw: if hours > 0.0 { kwh_per_day / hours } else { 0.0 },
                kwh_per_day,
                share_of_daily_pct: share(kwh_per_day),
            };
            (w.key.clone(), stat)
        })
        .collect();

    let top_hours = top_hours(&profile, options.top_n, share);

    let days_rollup = period_rollup(series, |ts| ts.date_naive().to_string());
    let months_rollup = period_rollup(series, |ts| ts.format("%Y-%m").to_string());
    let seasons = season_rollup(series, options.hemisphere);

    SummaryPayload {
        meta,
        stats: SummaryStats {
            total_import_kwh,
            solar_export_kwh,
            per_day_avg_kwh,
            peak_consumption_kw,
            peak_time,
            peaks,
            base,
            windows,
            top_hours,
        },
        profile,
        days: days_rollup,
        months: months_rollup,
        seasons,
    }
}

/// Groups records by a local-time label and totals them per flow.
///
/// Labels must sort chronologically; both `YYYY-MM-DD` and `YYYY-MM` do.
fn period_rollup(
    series: &CanonicalSeries,
    label: impl Fn(&DateTime<Tz>) -> String,
) -> Vec<PeriodUsage> {
    let mut periods: BTreeMap<String, (PeriodUsage, usize)> = BTreeMap::new();
    for r in series.records() {
        let (usage, import_intervals) = periods.entry(label(&r.timestamp)).or_default();
        *usage.flows.entry(r.flow).or_insert(0.0) += r.energy_kwh;
        if r.flow.is_import() {
            usage.import_kwh += r.energy_kwh;
            usage.peak_interval_kwh = usage.peak_interval_kwh.max(r.energy_kwh);
            *import_intervals += 1;
        } else {
            usage.export_kwh += r.energy_kwh;
        }
    }
    periods
        .into_iter()
        .map(|(period, (mut usage, import_intervals))| {
            usage.period = period;
            if import_intervals > 0 {
                usage.average_interval_kwh = usage.import_kwh / import_intervals as f64;
            }
            usage
        })
        .collect()
}

fn season_rollup(series: &CanonicalSeries, hemisphere: Hemisphere) -> Vec<SeasonUsage> {
    let mut seasons: BTreeMap<(i32, Season), BTreeMap<Flow, f64>> = BTreeMap::new();
    for r in series.records() {
        let season = Season::of_month(r.timestamp.month(), hemisphere);
        *seasons
            .entry((r.timestamp.year(), season))
            .or_default()
            .entry(r.flow)
            .or_insert(0.0) += r.energy_kwh;
    }
    seasons
        .into_iter()
        .map(|((year, season), flows)| {
            let (import_kwh, export_kwh) =
                flows.iter().fold((0.0_f64, 0.0_f64), |(imp, exp), (flow, kwh)| {
                    if flow.is_import() {
                        (imp + *kwh, exp)
                    } else {
                        (imp, exp + *kwh)
                    }
                });
            SeasonUsage {
                season,
                year,
                flows,
                import_kwh,
                export_kwh,
            }
        })
        .collect()
}

fn average_day_profile(series: &CanonicalSeries) -> Vec<ProfileSlot> {
    let dates: BTreeSet<NaiveDate> = series
        .records()
        .iter()
        .map(|r| r.timestamp.date_naive())
        .collect();
    if dates.is_empty() {
        return Vec::new();
    }
    let n_days = dates.len() as f64;

    let mut slots: BTreeMap<u32, BTreeMap<Flow, f64>> = BTreeMap::new();
    for r in series.records() {
        let secs = r.timestamp.num_seconds_from_midnight();
        *slots.entry(secs).or_default().entry(r.flow).or_insert(0.0) += r.energy_kwh;
    }

    slots
        .into_iter()
        .map(|(seconds, flows)| {
            let flows: BTreeMap<Flow, f64> =
                flows.into_iter().map(|(f, kwh)| (f, kwh / n_days)).collect();
            let import_total = flows
                .iter()
                .filter(|(f, _)| f.is_import())
                .map(|(_, kwh)| kwh)
                .sum();
            ProfileSlot {
                slot: format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60),
                flows,
                import_total,
                seconds,
            }
        })
        .collect()
}

fn top_hours(profile: &[ProfileSlot], n: usize, share: impl Fn(f64) -> f64) -> TopHours {
    let mut by_hour: BTreeMap<u32, f64> = BTreeMap::new();
    for p in profile {
        *by_hour.entry(p.seconds / 3600).or_insert(0.0) += p.import_total;
    }
    let mut ranked: Vec<(u32, f64)> = by_hour.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(n);

    let kwh_total = ranked.iter().map(|(_, kwh)| kwh).sum();
    TopHours {
        hours: ranked.iter().map(|(h, _)| format!("{h:02}:00")).collect(),
        kwh_total,
        share_of_daily_pct: share(kwh_total),
    }
}
