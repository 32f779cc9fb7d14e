//! Canonical interval model shared by every scenario stage.
//!
//! A [`CanonicalSeries`] is a row-oriented list of [`IntervalRecord`]s for a
//! single timezone. Direction lives in [`Flow`]; energy is always a
//! non-negative magnitude.

pub mod validate;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Zone used when a caller does not name one.
pub const DEFAULT_TZ: Tz = chrono_tz::Australia::Brisbane;

/// Cadence assumed for empty series and when inference has nothing to go on.
pub const DEFAULT_CADENCE_MIN: u32 = 30;

/// Semantic direction of an energy flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// General consumption drawn from the grid.
    GridImport,
    /// Separately metered controlled load (e.g. off-peak hot water).
    ControlledLoadImport,
    /// Rooftop solar fed back into the grid.
    GridExportSolar,
}

impl Flow {
    pub const ALL: [Flow; 3] = [
        Flow::GridImport,
        Flow::ControlledLoadImport,
        Flow::GridExportSolar,
    ];

    /// Wire name, e.g. `"grid_import"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Flow::GridImport => "grid_import",
            Flow::ControlledLoadImport => "controlled_load_import",
            Flow::GridExportSolar => "grid_export_solar",
        }
    }

    pub fn is_import(self) -> bool {
        matches!(self, Flow::GridImport | Flow::ControlledLoadImport)
    }

    pub fn is_export(self) -> bool {
        matches!(self, Flow::GridExportSolar)
    }

    /// Maps a raw register label to its flow (`E1`, `E2`, `B1`).
    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel.trim() {
            "E1" => Some(Flow::GridImport),
            "E2" => Some(Flow::ControlledLoadImport),
            "B1" => Some(Flow::GridExportSolar),
            _ => None,
        }
    }

    /// Channel label written for reconstructed rows of this flow.
    pub fn canonical_channel(self) -> &'static str {
        match self {
            Flow::GridImport => "E1",
            Flow::ControlledLoadImport => "E2",
            Flow::GridExportSolar => "B1",
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Flow::ALL
            .into_iter()
            .find(|flow| flow.as_str() == s.trim())
            .ok_or_else(|| format!("unknown flow \"{s}\""))
    }
}

/// One fixed-duration interval reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalRecord {
    /// Start of the interval, local to the series timezone.
    pub timestamp: DateTime<Tz>,
    pub meter_id: String,
    /// Raw register label, e.g. `"E1"`.
    pub channel: String,
    pub flow: Flow,
    pub energy_kwh: f64,
    pub interval_minutes: u32,
}

/// Canonical interval series for one timezone.
///
/// Construction does not validate; run [`validate::validate`] (or build via
/// [`CanonicalSeries::validated`]) before trusting the invariants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalSeries {
    tz: Tz,
    records: Vec<IntervalRecord>,
}

impl CanonicalSeries {
    pub fn new(tz: Tz, records: Vec<IntervalRecord>) -> Self {
        Self { tz, records }
    }

    /// Sorts the records and checks every canonical invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validated(tz: Tz, records: Vec<IntervalRecord>) -> crate::Result<Self> {
        let mut series = Self::new(tz, records);
        series.sort();
        validate::validate(&series)?;
        Ok(series)
    }

    /// A well-formed series with no rows.
    pub fn empty(tz: Tz) -> Self {
        Self {
            tz,
            records: Vec::new(),
        }
    }

    /// Materializes one dense per-flow block, one row per timestamp.
    ///
    /// Zero-valued intervals are kept; callers that want sparse output filter
    /// before building.
    ///
    /// # Panics
    ///
    /// Panics if `timestamps` and `values` differ in length.
    pub fn from_dense(
        tz: Tz,
        timestamps: &[DateTime<Tz>],
        values: &[f64],
        meter_id: &str,
        channel: &str,
        flow: Flow,
        interval_minutes: u32,
    ) -> Self {
        assert_eq!(timestamps.len(), values.len());
        let records = timestamps
            .iter()
            .zip(values)
            .map(|(ts, &kwh)| IntervalRecord {
                timestamp: ts.with_timezone(&tz),
                meter_id: meter_id.to_string(),
                channel: channel.to_string(),
                flow,
                energy_kwh: kwh,
                interval_minutes,
            })
            .collect();
        let mut series = Self { tz, records };
        series.sort();
        series
    }

    /// Appends another series' rows and re-sorts.
    pub fn extend(&mut self, other: CanonicalSeries) {
        self.records
            .extend(other.records.into_iter().map(|mut r| {
                r.timestamp = r.timestamp.with_timezone(&self.tz);
                r
            }));
        self.sort();
    }

    /// Stable sort by timestamp, then flow, then channel.
    pub fn sort(&mut self) {
        self.records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.flow.cmp(&b.flow))
                .then_with(|| a.channel.cmp(&b.channel))
        });
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn records(&self) -> &[IntervalRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<IntervalRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted, de-duplicated interval starts across every channel.
    pub fn timestamps(&self) -> Vec<DateTime<Tz>> {
        let mut out: Vec<DateTime<Tz>> = self.records.iter().map(|r| r.timestamp).collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn meter_ids(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(|r| r.meter_id.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn channels(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(|r| r.channel.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn flows(&self) -> Vec<Flow> {
        self.records
            .iter()
            .map(|r| r.flow)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Keeps only the rows of one metering point.
    pub fn for_meter(&self, meter_id: &str) -> Self {
        Self {
            tz: self.tz,
            records: self
                .records
                .iter()
                .filter(|r| r.meter_id == meter_id)
                .cloned()
                .collect(),
        }
    }

    /// Cadence of the first record, or [`DEFAULT_CADENCE_MIN`] when empty.
    pub fn cadence_minutes(&self) -> u32 {
        self.records
            .first()
            .map_or(DEFAULT_CADENCE_MIN, |r| r.interval_minutes)
    }

    pub fn interval_hours(&self) -> f64 {
        f64::from(self.cadence_minutes()) / 60.0
    }

    /// Total kWh per flow; flows with no rows are absent.
    pub fn flow_totals(&self) -> BTreeMap<Flow, f64> {
        let mut totals = BTreeMap::new();
        for r in &self.records {
            *totals.entry(r.flow).or_insert(0.0) += r.energy_kwh;
        }
        totals
    }

    /// Sum over every import flow.
    pub fn import_kwh(&self) -> f64 {
        self.records
            .iter()
            .filter(|r| r.flow.is_import())
            .map(|r| r.energy_kwh)
            .sum()
    }

    /// Sum over every export flow.
    pub fn export_kwh(&self) -> f64 {
        self.records
            .iter()
            .filter(|r| r.flow.is_export())
            .map(|r| r.energy_kwh)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn stamps(n: usize) -> Vec<DateTime<Tz>> {
        let start = DEFAULT_TZ.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| start + Duration::minutes(30 * i as i64))
            .collect()
    }

    #[test]
    fn channel_map_covers_known_registers() {
        assert_eq!(Flow::from_channel("E1"), Some(Flow::GridImport));
        assert_eq!(Flow::from_channel("E2"), Some(Flow::ControlledLoadImport));
        assert_eq!(Flow::from_channel("B1"), Some(Flow::GridExportSolar));
        assert_eq!(Flow::from_channel("Q9"), None);
        for flow in Flow::ALL {
            assert_eq!(Flow::from_channel(flow.canonical_channel()), Some(flow));
        }
    }

    #[test]
    fn flow_parses_wire_names() {
        assert_eq!("grid_import".parse::<Flow>(), Ok(Flow::GridImport));
        assert!("solar".parse::<Flow>().is_err());
        assert!(Flow::ControlledLoadImport.is_import());
        assert!(Flow::GridExportSolar.is_export());
        assert!(!Flow::GridExportSolar.is_import());
    }

    #[test]
    fn from_dense_builds_one_row_per_timestamp() {
        let ts = stamps(4);
        let s = CanonicalSeries::from_dense(
            DEFAULT_TZ,
            &ts,
            &[0.5, 0.0, 1.0, 0.25],
            "Q1",
            "E1",
            Flow::GridImport,
            30,
        );
        assert_eq!(s.len(), 4);
        assert_eq!(s.timestamps(), ts);
        assert_eq!(s.cadence_minutes(), 30);
        assert_eq!(s.interval_hours(), 0.5);
        assert_eq!(s.import_kwh(), 1.75);
        assert_eq!(s.export_kwh(), 0.0);
    }

    #[test]
    fn extend_merges_and_sorts_flows() {
        let ts = stamps(2);
        let mut s = CanonicalSeries::from_dense(
            DEFAULT_TZ,
            &ts,
            &[0.1, 0.2],
            "Q1",
            "B1",
            Flow::GridExportSolar,
            30,
        );
        s.extend(CanonicalSeries::from_dense(
            DEFAULT_TZ,
            &ts,
            &[1.0, 2.0],
            "Q1",
            "E1",
            Flow::GridImport,
            30,
        ));
        let flows: Vec<Flow> = s.records().iter().map(|r| r.flow).collect();
        assert_eq!(
            flows,
            vec![
                Flow::GridImport,
                Flow::GridExportSolar,
                Flow::GridImport,
                Flow::GridExportSolar
            ]
        );
        assert_eq!(s.timestamps().len(), 2);
        assert_eq!(s.flows(), vec![Flow::GridImport, Flow::GridExportSolar]);
    }

    #[test]
    fn for_meter_filters_rows() {
        let ts = stamps(2);
        let mut s =
            CanonicalSeries::from_dense(DEFAULT_TZ, &ts, &[1.0, 1.0], "A", "E1", Flow::GridImport, 30);
        s.extend(CanonicalSeries::from_dense(
            DEFAULT_TZ,
            &ts,
            &[2.0, 2.0],
            "B",
            "E1",
            Flow::GridImport,
            30,
        ));
        assert_eq!(s.meter_ids(), vec!["A", "B"]);
        let b = s.for_meter("B");
        assert_eq!(b.len(), 2);
        assert_eq!(b.import_kwh(), 4.0);
    }

    #[test]
    fn empty_series_uses_default_cadence() {
        let s = CanonicalSeries::empty(DEFAULT_TZ);
        assert!(s.is_empty());
        assert_eq!(s.cadence_minutes(), DEFAULT_CADENCE_MIN);
        assert!(s.flow_totals().is_empty());
    }
}
