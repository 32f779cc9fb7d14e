//! Scenario output types: the per-interval trace and the complete result.

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::canon::CanonicalSeries;
use crate::summary::SummaryPayload;
use crate::tariff::{CostTable, CycleCostTable};

use super::kpi::{ScenarioDelta, ScenarioExplain};

/// Every energy flow of one interval, as the pipeline saw it.
///
/// All values are kWh for the interval. Stage identities hold exactly:
/// `baseline_import + ev - pv_used == import_before_battery` and
/// `import_before_battery - battery_discharge == import_after`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalTrace {
    pub timestamp: DateTime<Tz>,
    pub baseline_import_kwh: f64,
    pub baseline_export_kwh: f64,
    pub ev_kwh: f64,
    pub pv_kwh: f64,
    /// PV consumed directly by the load.
    pub pv_used_kwh: f64,
    /// PV left after the load, before the battery.
    pub pv_excess_kwh: f64,
    pub import_before_battery_kwh: f64,
    pub export_before_battery_kwh: f64,
    pub battery_charge_kwh: f64,
    pub battery_discharge_kwh: f64,
    /// Stored energy after the interval (kWh); zero without a battery.
    pub battery_soc_kwh: f64,
    pub import_after_kwh: f64,
    pub export_after_kwh: f64,
}

/// Complete, internally consistent outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    pub name: Option<String>,
    pub before: CanonicalSeries,
    pub after: CanonicalSeries,
    pub summary_before: SummaryPayload,
    pub summary_after: SummaryPayload,
    /// Present only when the scenario carries a tariff.
    pub cost_before: Option<CostTable>,
    pub cost_after: Option<CostTable>,
    /// Present only when the scenario carries a tariff and billing cycles.
    pub cycle_cost_before: Option<CycleCostTable>,
    pub cycle_cost_after: Option<CycleCostTable>,
    pub delta: ScenarioDelta,
    pub explain: ScenarioExplain,
    pub trace: Vec<IntervalTrace>,
}

impl ScenarioResult {
    /// Number of intervals on the collapsed timeline.
    pub fn intervals(&self) -> usize {
        self.trace.len()
    }
}
