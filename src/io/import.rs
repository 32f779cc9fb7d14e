//! Canonical CSV reader.
//!
//! Expected columns: `timestamp, meter_id, channel, energy_kwh`, plus the
//! optional `flow` and `interval_minutes`. Timestamps either carry a UTC
//! offset (converted into the target zone) or are naive wall-clock times
//! (localized in the supplied zone).

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, info};

use crate::canon::{CanonicalSeries, DEFAULT_CADENCE_MIN, DEFAULT_TZ, Flow, IntervalRecord};
use crate::error::{Error, Result};
use crate::sim::clock::infer_cadence;

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    meter_id: String,
    channel: String,
    #[serde(default)]
    flow: Option<String>,
    energy_kwh: f64,
    #[serde(default)]
    interval_minutes: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
enum RawTimestamp {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

fn parse_timestamp(s: &str) -> Option<RawTimestamp> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(RawTimestamp::Aware(dt));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(RawTimestamp::Aware(dt));
        }
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(RawTimestamp::Naive)
}

/// Localizes a wall-clock time.
///
/// During a DST fall-back the earlier instant is taken unless it would not
/// move past `previous` (the group's last timestamp), in which case the
/// later one is.
fn localize(
    naive: NaiveDateTime,
    tz: Tz,
    previous: Option<DateTime<Tz>>,
    raw: &str,
) -> Result<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(early, late) => {
            if previous.is_some_and(|p| early <= p) {
                Ok(late)
            } else {
                Ok(early)
            }
        }
        LocalResult::None => Err(Error::NonexistentLocalTime(
            raw.to_string(),
            tz.name().to_string(),
        )),
    }
}

struct PendingRecord {
    timestamp: DateTime<Tz>,
    meter_id: String,
    channel: String,
    flow: Flow,
    energy_kwh: f64,
    interval_minutes: Option<u32>,
}

/// Reads canonical interval rows from any CSV source.
///
/// Negative energies are taken as magnitudes; direction comes from `flow`,
/// or from the channel code (`E1`, `E2`, `B1`) when `flow` is absent.
/// Rows repeating a (meter, channel, timestamp) key after the first are
/// dropped. Missing cadences are inferred per (meter, channel) group.
///
/// # Arguments
///
/// * `reader` - CSV source with a header row
/// * `tz` - Zone for the series; required when any timestamp is naive
///
/// # Errors
///
/// - [`Error::Csv`] on malformed CSV or unparsable numbers
/// - [`Error::Row`] for an unreadable timestamp or unknown channel/flow
/// - [`Error::NaiveTimestamp`] for a naive timestamp with `tz` absent
/// - [`Error::NonexistentLocalTime`] for a wall time skipped by DST
/// - [`Error::Canon`] if the assembled series is not canonical
pub fn read_canonical_csv<R: Read>(reader: R, tz: Option<Tz>) -> Result<CanonicalSeries> {
    let target = tz.unwrap_or(DEFAULT_TZ);
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut pending: Vec<PendingRecord> = Vec::new();
    let mut last_seen: HashMap<(String, String), DateTime<Tz>> = HashMap::new();
    let mut seen: HashSet<(String, String, DateTime<Tz>)> = HashSet::new();
    let mut duplicates = 0usize;

    for (i, row) in rdr.deserialize::<CsvRow>().enumerate() {
        let line = i + 2;
        let row = row?;

        let flow = match row.flow.as_deref().filter(|f| !f.is_empty()) {
            Some(f) => f.parse::<Flow>().map_err(|message| Error::Row { row: line, message })?,
            None => Flow::from_channel(&row.channel).ok_or_else(|| Error::Row {
                row: line,
                message: format!("unknown channel \"{}\" and no flow column", row.channel),
            })?,
        };

        let key = (row.meter_id.clone(), row.channel.clone());
        let timestamp = match parse_timestamp(&row.timestamp) {
            Some(RawTimestamp::Aware(dt)) => dt.with_timezone(&target),
            Some(RawTimestamp::Naive(naive)) => {
                let zone = tz.ok_or_else(|| Error::NaiveTimestamp(row.timestamp.clone()))?;
                localize(naive, zone, last_seen.get(&key).copied(), &row.timestamp)?
            }
            None => {
                return Err(Error::Row {
                    row: line,
                    message: format!("unreadable timestamp \"{}\"", row.timestamp),
                });
            }
        };
        last_seen.insert(key, timestamp);

        if !seen.insert((row.meter_id.clone(), row.channel.clone(), timestamp)) {
            duplicates += 1;
            continue;
        }

        pending.push(PendingRecord {
            timestamp,
            meter_id: row.meter_id,
            channel: row.channel,
            flow,
            energy_kwh: row.energy_kwh.abs(),
            interval_minutes: row.interval_minutes.filter(|&m| m > 0),
        });
    }

    if duplicates > 0 {
        debug!(duplicates, "dropped repeated (meter, channel, timestamp) rows");
    }

    let mut group_times: HashMap<(&str, &str), Vec<DateTime<Tz>>> = HashMap::new();
    for p in pending.iter().filter(|p| p.interval_minutes.is_none()) {
        group_times
            .entry((p.meter_id.as_str(), p.channel.as_str()))
            .or_default()
            .push(p.timestamp);
    }
    let cadences: HashMap<(String, String), u32> = group_times
        .into_iter()
        .map(|((meter, channel), times)| {
            (
                (meter.to_string(), channel.to_string()),
                infer_cadence(&times, DEFAULT_CADENCE_MIN),
            )
        })
        .collect();

    let records: Vec<IntervalRecord> = pending
        .into_iter()
        .map(|p| {
            let interval_minutes = p.interval_minutes.unwrap_or_else(|| {
                cadences
                    .get(&(p.meter_id.clone(), p.channel.clone()))
                    .copied()
                    .unwrap_or(DEFAULT_CADENCE_MIN)
            });
            IntervalRecord {
                timestamp: p.timestamp,
                meter_id: p.meter_id,
                channel: p.channel,
                flow: p.flow,
                energy_kwh: p.energy_kwh,
                interval_minutes,
            }
        })
        .collect();

    let series = CanonicalSeries::validated(target, records)?;
    info!(
        records = series.len(),
        meters = series.meter_ids().len(),
        tz = target.name(),
        "loaded canonical series"
    );
    Ok(series)
}

/// Reads a canonical CSV file.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be opened, otherwise as
/// [`read_canonical_csv`].
pub fn read_canonical_csv_path(path: &Path, tz: Option<Tz>) -> Result<CanonicalSeries> {
    let file = File::open(path)?;
    read_canonical_csv(file, tz)
}
