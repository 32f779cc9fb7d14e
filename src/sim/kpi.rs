//! Before/after comparison metrics derived from a scenario run.

use std::fmt;

use serde::Serialize;

use crate::canon::CanonicalSeries;
use crate::tariff::CostTable;

use super::types::IntervalTrace;

/// Floor on battery capacity when estimating cycles.
const MIN_CAPACITY_KWH: f64 = 1e-6;

/// Change from the baseline to the scenario (after minus before).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioDelta {
    pub import_kwh_delta: f64,
    pub export_kwh_delta: f64,
    /// Change in import plus export.
    pub total_kwh_delta: f64,
    /// Absent when the scenario has no tariff.
    pub cost_total_delta: Option<f64>,
}

impl ScenarioDelta {
    /// Compares two series over all import flows and all export flows.
    ///
    /// # Arguments
    ///
    /// * `before` - Baseline series
    /// * `after` - Reconstructed scenario series
    /// * `costs` - Before and after cost tables, when a tariff was applied
    pub fn between(
        before: &CanonicalSeries,
        after: &CanonicalSeries,
        costs: Option<(&CostTable, &CostTable)>,
    ) -> Self {
        let import_b = before.import_kwh();
        let export_b = before.export_kwh();
        let import_a = after.import_kwh();
        let export_a = after.export_kwh();
        Self {
            import_kwh_delta: import_a - import_b,
            export_kwh_delta: export_a - export_b,
            total_kwh_delta: (import_a + export_a) - (import_b + export_b),
            cost_total_delta: costs.map(|(b, a)| a.total() - b.total()),
        }
    }
}

/// Where the change came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioExplain {
    pub ev_kwh: f64,
    pub pv_kwh: f64,
    pub battery_discharge_kwh: f64,
    pub battery_charge_kwh: f64,
    /// Discharge throughput divided by capacity.
    pub battery_cycles_est: f64,
    /// Share of generation used on site; absent without PV output.
    pub pv_self_consumption_pct: Option<f64>,
}

impl ScenarioExplain {
    /// Sums the trace.
    ///
    /// # Arguments
    ///
    /// * `trace` - Per-interval flows of the run
    /// * `battery_capacity_kwh` - Capacity of the dispatched battery, if any
    pub fn from_trace(trace: &[IntervalTrace], battery_capacity_kwh: Option<f64>) -> Self {
        let mut ev_kwh = 0.0;
        let mut pv_kwh = 0.0;
        let mut pv_used = 0.0;
        let mut battery_discharge_kwh = 0.0;
        let mut battery_charge_kwh = 0.0;
        for t in trace {
            ev_kwh += t.ev_kwh;
            pv_kwh += t.pv_kwh;
            pv_used += t.pv_used_kwh;
            battery_discharge_kwh += t.battery_discharge_kwh;
            battery_charge_kwh += t.battery_charge_kwh;
        }

        let battery_cycles_est = battery_capacity_kwh
            .map_or(0.0, |cap| battery_discharge_kwh / cap.max(MIN_CAPACITY_KWH));
        let pv_self_consumption_pct = (pv_kwh > 0.0).then(|| 100.0 * pv_used / pv_kwh);

        Self {
            ev_kwh,
            pv_kwh,
            battery_discharge_kwh,
            battery_charge_kwh,
            battery_cycles_est,
            pv_self_consumption_pct,
        }
    }
}

/// Plain-text before/after report for one run.
pub struct ScenarioReport<'a> {
    pub name: &'a str,
    pub import_before_kwh: f64,
    pub export_before_kwh: f64,
    pub delta: &'a ScenarioDelta,
    pub explain: &'a ScenarioExplain,
}

impl fmt::Display for ScenarioReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.delta;
        let e = self.explain;
        writeln!(f, "--- Scenario Report: {} ---", self.name)?;
        writeln!(
            f,
            "Grid import:           {:.2} kWh -> {:.2} kWh ({:+.2})",
            self.import_before_kwh,
            self.import_before_kwh + d.import_kwh_delta,
            d.import_kwh_delta
        )?;
        writeln!(
            f,
            "Grid export:           {:.2} kWh -> {:.2} kWh ({:+.2})",
            self.export_before_kwh,
            self.export_before_kwh + d.export_kwh_delta,
            d.export_kwh_delta
        )?;
        writeln!(f, "EV charging:           {:.2} kWh", e.ev_kwh)?;
        writeln!(f, "PV generation:         {:.2} kWh", e.pv_kwh)?;
        match e.pv_self_consumption_pct {
            Some(pct) => writeln!(f, "PV self-consumption:   {pct:.1}%")?,
            None => writeln!(f, "PV self-consumption:   n/a")?,
        }
        writeln!(
            f,
            "Battery:               {:.2} kWh in, {:.2} kWh out ({:.2} est. cycles)",
            e.battery_charge_kwh, e.battery_discharge_kwh, e.battery_cycles_est
        )?;
        match d.cost_total_delta {
            Some(c) => write!(f, "Cost change:           {c:+.2}"),
            None => write!(f, "Cost change:           n/a (no tariff)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::{DEFAULT_TZ, Flow};
    use crate::tariff::CostRow;
    use approx::assert_abs_diff_eq;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn trace_row(ev: f64, pv: f64, used: f64, charge: f64, discharge: f64) -> IntervalTrace {
        IntervalTrace {
            timestamp: DEFAULT_TZ.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
            baseline_import_kwh: 0.5,
            baseline_export_kwh: 0.0,
            ev_kwh: ev,
            pv_kwh: pv,
            pv_used_kwh: used,
            pv_excess_kwh: pv - used,
            import_before_battery_kwh: 0.5 + ev - used,
            export_before_battery_kwh: pv - used,
            battery_charge_kwh: charge,
            battery_discharge_kwh: discharge,
            battery_soc_kwh: 0.0,
            import_after_kwh: 0.5 + ev - used - discharge,
            export_after_kwh: pv - used - charge,
        }
    }

    fn cost(total: f64) -> CostTable {
        CostTable {
            rows: vec![CostRow {
                month: "2025-01".to_string(),
                band_kwh: BTreeMap::new(),
                unassigned_kwh: 0.0,
                export_kwh: 0.0,
                demand_kw: 0.0,
                days_in_month: 31,
                energy_cost: total,
                demand_cost: 0.0,
                fixed_cost: 0.0,
                feed_in_credit: 0.0,
                total,
            }],
        }
    }

    #[test]
    fn explain_sums_trace() {
        let trace = vec![
            trace_row(1.0, 2.0, 1.5, 0.5, 0.0),
            trace_row(0.0, 1.0, 0.5, 0.0, 0.4),
        ];
        let e = ScenarioExplain::from_trace(&trace, Some(10.0));
        assert_abs_diff_eq!(e.ev_kwh, 1.0);
        assert_abs_diff_eq!(e.pv_kwh, 3.0);
        assert_abs_diff_eq!(e.battery_charge_kwh, 0.5);
        assert_abs_diff_eq!(e.battery_discharge_kwh, 0.4);
        assert_abs_diff_eq!(e.battery_cycles_est, 0.04, epsilon = 1e-12);
        assert_abs_diff_eq!(e.pv_self_consumption_pct.unwrap(), 100.0 * 2.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn self_consumption_is_absent_without_generation() {
        let trace = vec![trace_row(0.0, 0.0, 0.0, 0.0, 0.0)];
        let e = ScenarioExplain::from_trace(&trace, None);
        assert_eq!(e.pv_self_consumption_pct, None);
        assert_eq!(e.battery_cycles_est, 0.0);
    }

    #[test]
    fn delta_compares_totals_and_costs() {
        let start = DEFAULT_TZ.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let idx: Vec<_> = (0..4).map(|i| start + Duration::minutes(30 * i)).collect();
        let before =
            CanonicalSeries::from_dense(DEFAULT_TZ, &idx, &[1.0; 4], "Q1", "E1", Flow::GridImport, 30);
        let mut after =
            CanonicalSeries::from_dense(DEFAULT_TZ, &idx, &[0.5; 4], "Q1", "E1", Flow::GridImport, 30);
        after.extend(CanonicalSeries::from_dense(
            DEFAULT_TZ, &idx[..1], &[0.25], "Q1", "B1", Flow::GridExportSolar, 30,
        ));

        let d = ScenarioDelta::between(&before, &after, None);
        assert_abs_diff_eq!(d.import_kwh_delta, -2.0);
        assert_abs_diff_eq!(d.export_kwh_delta, 0.25);
        assert_abs_diff_eq!(d.total_kwh_delta, -1.75);
        assert_eq!(d.cost_total_delta, None);

        let (cb, ca) = (cost(10.0), cost(7.5));
        let d = ScenarioDelta::between(&before, &after, Some((&cb, &ca)));
        assert_abs_diff_eq!(d.cost_total_delta.unwrap(), -2.5);
    }

    #[test]
    fn report_renders_missing_metrics() {
        let delta = ScenarioDelta::default();
        let explain = ScenarioExplain::default();
        let text = ScenarioReport {
            name: "baseline",
            import_before_kwh: 24.0,
            export_before_kwh: 0.0,
            delta: &delta,
            explain: &explain,
        }
        .to_string();
        assert!(text.contains("Scenario Report: baseline"));
        assert!(text.contains("PV self-consumption:   n/a"));
        assert!(text.contains("n/a (no tariff)"));
    }
}
