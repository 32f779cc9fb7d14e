//! Household energy balance: flow collapse and PV offset.
//!
//! All quantities are non-negative kWh per interval on one shared timeline.

use chrono::DateTime;
use chrono_tz::Tz;

use crate::canon::CanonicalSeries;

/// Import and export per interval over a dense timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowBalance {
    pub timestamps: Vec<DateTime<Tz>>,
    /// Sum of every import flow (general and controlled load).
    pub import_kwh: Vec<f64>,
    /// Sum of every export flow.
    pub export_kwh: Vec<f64>,
}

impl FlowBalance {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Collapses a canonical series into dense import and export sequences.
///
/// The timeline is every distinct timestamp in the series. Intervals where a
/// flow has no row are zero, so a series with no export at all still yields
/// an export sequence of the full length.
pub fn collapse_flows(series: &CanonicalSeries) -> FlowBalance {
    let timestamps = series.timestamps();
    let mut import_kwh = vec![0.0; timestamps.len()];
    let mut export_kwh = vec![0.0; timestamps.len()];

    for r in series.records() {
        let Ok(i) = timestamps.binary_search(&r.timestamp) else {
            continue;
        };
        if r.flow.is_import() {
            import_kwh[i] += r.energy_kwh;
        } else if r.flow.is_export() {
            export_kwh[i] += r.energy_kwh;
        }
    }

    FlowBalance {
        timestamps,
        import_kwh,
        export_kwh,
    }
}

/// Adds an extra load (e.g. EV charging) to import, element-wise.
///
/// # Panics
///
/// Panics if the slices differ in length.
pub fn add_load(import_kwh: &[f64], extra_kwh: &[f64]) -> Vec<f64> {
    assert_eq!(import_kwh.len(), extra_kwh.len());
    import_kwh
        .iter()
        .zip(extra_kwh)
        .map(|(base, extra)| base + extra)
        .collect()
}

/// How on-site generation splits between the load and the surplus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PvOffset {
    /// Generation consumed directly by the load.
    pub used_kwh: Vec<f64>,
    /// Generation left over after the load, before any battery.
    pub excess_kwh: Vec<f64>,
    /// `load - used`.
    pub import_after_kwh: Vec<f64>,
    /// `baseline_export + excess`.
    pub export_after_kwh: Vec<f64>,
}

impl PvOffset {
    pub fn total_used_kwh(&self) -> f64 {
        self.used_kwh.iter().sum()
    }
}

/// Offsets load with PV generation interval by interval.
///
/// `used = min(pv, load)`; the remainder becomes excess and is added on top
/// of whatever the household already exported.
///
/// # Arguments
///
/// * `load_kwh` - Import including any added EV load
/// * `pv_kwh` - Generation per interval
/// * `baseline_export_kwh` - Export already present in the baseline
///
/// # Panics
///
/// Panics if the slices differ in length.
pub fn offset_with_pv(load_kwh: &[f64], pv_kwh: &[f64], baseline_export_kwh: &[f64]) -> PvOffset {
    assert_eq!(load_kwh.len(), pv_kwh.len());
    assert_eq!(load_kwh.len(), baseline_export_kwh.len());

    let n = load_kwh.len();
    let mut out = PvOffset {
        used_kwh: Vec::with_capacity(n),
        excess_kwh: Vec::with_capacity(n),
        import_after_kwh: Vec::with_capacity(n),
        export_after_kwh: Vec::with_capacity(n),
    };

    for ((&load, &pv), &export) in load_kwh.iter().zip(pv_kwh).zip(baseline_export_kwh) {
        let used = pv.min(load);
        let excess = pv - used;
        out.used_kwh.push(used);
        out.excess_kwh.push(excess);
        out.import_after_kwh.push(load - used);
        out.export_after_kwh.push(export + excess);
    }

    out
}

/// Export after storage: the baseline export plus whatever PV excess the
/// battery did not absorb.
///
/// # Panics
///
/// Panics if the slices differ in length.
pub fn export_after_storage(baseline_export_kwh: &[f64], excess_after_kwh: &[f64]) -> Vec<f64> {
    add_load(baseline_export_kwh, excess_after_kwh)
}
