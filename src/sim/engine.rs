//! Scenario engine: composes EV load, PV offset and battery dispatch against
//! a baseline meter series and reports the before/after comparison.

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::canon::validate::validate;
use crate::canon::{CanonicalSeries, Flow, IntervalRecord};
use crate::config::ConfigError;
use crate::devices::{
    BatteryConfig, DispatchOutcome, EvConfig, IntervalProfile, PvConfig, dispatch,
};
use crate::error::{Error, Result};
use crate::summary::{SummaryOptions, summarise};
use crate::tariff::{BillingOptions, TariffPlan, estimate_cycle_costs, estimate_monthly_cost};

use super::kpi::{ScenarioDelta, ScenarioExplain};
use super::power_balance::{add_load, collapse_flows, export_after_storage, offset_with_pv};
use super::types::{IntervalTrace, ScenarioResult};

/// One what-if scenario: which components to add and how to price and
/// summarise the outcome.
///
/// Every component is optional; an empty scenario reproduces the baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: Option<String>,
    pub ev: Option<EvConfig>,
    pub pv: Option<PvConfig>,
    pub battery: Option<BatteryConfig>,
    pub tariff: Option<TariffPlan>,
    /// Explicit billing cycles, priced with `tariff`.
    pub billing: Option<BillingOptions>,
    pub summary: SummaryOptions,
}

impl Scenario {
    /// Collects every component setting that cannot be simulated.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if let Some(ev) = &self.ev {
            errors.extend(ev.validate("ev"));
        }
        if let Some(pv) = &self.pv {
            errors.extend(pv.validate("pv"));
        }
        if let Some(battery) = &self.battery {
            errors.extend(battery.validate("battery"));
        }
        if let Some(tariff) = &self.tariff {
            errors.extend(tariff.validate("tariff"));
        }
        if let Some(billing) = &self.billing {
            errors.extend(billing.validate("billing"));
            if self.tariff.is_none() {
                errors.push(ConfigError::new("billing", "billing cycles need a tariff"));
            }
        }
        errors.extend(self.summary.validate("summary"));
        errors
    }

    /// Runs the scenario against a baseline series.
    ///
    /// Stages, in order: validate the config and the input, collapse it to import/export,
    /// add EV load, offset with PV, dispatch the battery, rebuild a canonical
    /// after-series, then summarise, price and compare both sides.
    ///
    /// # Arguments
    ///
    /// * `baseline` - Canonical series for a single meter
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] with the first problem [`Scenario::validate`]
    ///   reports; nothing is simulated in that case
    /// - [`Error::Canon`] if the baseline (or the rebuilt series) breaks a
    ///   canonical invariant
    /// - [`Error::MultipleMeters`] if the baseline holds more than one meter
    pub fn run(&self, baseline: &CanonicalSeries) -> Result<ScenarioResult> {
        let mut problems = self.validate().into_iter();
        if let Some(first) = problems.next() {
            for other in problems {
                warn!(%other, "scenario config rejected");
            }
            return Err(first.into());
        }
        validate(baseline)?;
        let meter_ids = baseline.meter_ids();
        if meter_ids.len() > 1 {
            return Err(Error::MultipleMeters {
                count: meter_ids.len(),
                ids: meter_ids.join(", "),
            });
        }
        let meter_id = meter_ids.first().map_or_else(String::new, |id| id.to_string());

        let tz = baseline.tz();
        let cadence = baseline.cadence_minutes();
        let hours = baseline.interval_hours();
        let name = self.name.as_deref().unwrap_or("custom");
        info!(
            scenario = name,
            meter = %meter_id,
            records = baseline.len(),
            cadence_min = cadence,
            "running scenario"
        );

        let balance = collapse_flows(baseline);
        let n = balance.len();
        debug!(intervals = n, "collapsed baseline flows");

        let ev_kwh = profile(self.ev.as_ref(), &balance.timestamps, hours)?;
        let load_kwh = add_load(&balance.import_kwh, &ev_kwh);

        let pv_kwh = profile(self.pv.as_ref(), &balance.timestamps, hours)?;
        if self.pv.is_some() && n > 0 && pv_kwh.iter().all(|&e| e == 0.0) {
            warn!("PV configured but generated nothing over the series");
        }
        let offset = offset_with_pv(&load_kwh, &pv_kwh, &balance.export_kwh);
        debug!(pv_used_kwh = offset.total_used_kwh(), "offset load with PV");

        let storage = match &self.battery {
            Some(battery) => dispatch(
                battery,
                offset.import_after_kwh.clone(),
                offset.excess_kwh.clone(),
                hours,
            ),
            None => DispatchOutcome::idle(
                offset.import_after_kwh.clone(),
                offset.excess_kwh.clone(),
            ),
        };
        debug!(
            charge_kwh = storage.total_charge_kwh(),
            discharge_kwh = storage.total_discharge_kwh(),
            "dispatched battery"
        );

        let export_after_kwh = export_after_storage(&balance.export_kwh, &storage.pv_excess_after_kwh);

        let mut records = Vec::new();
        for (i, ts) in balance.timestamps.iter().enumerate() {
            for (flow, kwh) in [
                (Flow::GridImport, storage.import_after_kwh[i]),
                (Flow::GridExportSolar, export_after_kwh[i]),
            ] {
                if kwh > 0.0 {
                    records.push(IntervalRecord {
                        timestamp: *ts,
                        meter_id: meter_id.clone(),
                        channel: flow.canonical_channel().to_string(),
                        flow,
                        energy_kwh: kwh,
                        interval_minutes: cadence,
                    });
                }
            }
        }
        let after = CanonicalSeries::validated(tz, records)?;

        let trace: Vec<IntervalTrace> = (0..n)
            .map(|i| IntervalTrace {
                timestamp: balance.timestamps[i],
                baseline_import_kwh: balance.import_kwh[i],
                baseline_export_kwh: balance.export_kwh[i],
                ev_kwh: ev_kwh[i],
                pv_kwh: pv_kwh[i],
                pv_used_kwh: offset.used_kwh[i],
                pv_excess_kwh: offset.excess_kwh[i],
                import_before_battery_kwh: offset.import_after_kwh[i],
                export_before_battery_kwh: offset.export_after_kwh[i],
                battery_charge_kwh: storage.charge_kwh[i],
                battery_discharge_kwh: storage.discharge_kwh[i],
                battery_soc_kwh: storage.soc_kwh[i],
                import_after_kwh: storage.import_after_kwh[i],
                export_after_kwh: export_after_kwh[i],
            })
            .collect();

        let summary_before = summarise(baseline, &self.summary);
        let summary_after = summarise(&after, &self.summary);

        let (cost_before, cost_after) = match &self.tariff {
            Some(plan) => (
                Some(estimate_monthly_cost(baseline, plan)),
                Some(estimate_monthly_cost(&after, plan)),
            ),
            None => (None, None),
        };
        let (cycle_cost_before, cycle_cost_after) = match (&self.tariff, &self.billing) {
            (Some(plan), Some(billing)) => (
                Some(estimate_cycle_costs(baseline, plan, billing)?),
                Some(estimate_cycle_costs(&after, plan, billing)?),
            ),
            _ => (None, None),
        };
        let costs = cost_before.as_ref().zip(cost_after.as_ref());
        let delta = ScenarioDelta::between(baseline, &after, costs);

        let capacity = self
            .battery
            .as_ref()
            .filter(|b| b.is_enabled())
            .map(|b| b.capacity_kwh);
        let explain = ScenarioExplain::from_trace(&trace, capacity);

        info!(
            scenario = name,
            import_delta_kwh = delta.import_kwh_delta,
            export_delta_kwh = delta.export_kwh_delta,
            after_records = after.len(),
            "scenario complete"
        );

        Ok(ScenarioResult {
            name: self.name.clone(),
            before: baseline.clone(),
            after,
            summary_before,
            summary_after,
            cost_before,
            cost_after,
            cycle_cost_before,
            cycle_cost_after,
            delta,
            explain,
            trace,
        })
    }
}

/// Energy from an optional component, or zeros when it is absent.
fn profile<P: IntervalProfile>(
    component: Option<&P>,
    index: &[DateTime<Tz>],
    interval_hours: f64,
) -> Result<Vec<f64>> {
    match component {
        Some(p) => {
            let kwh = p.energy_kwh(index, interval_hours)?;
            debug!(
                device = p.device_type(),
                total_kwh = kwh.iter().sum::<f64>(),
                "computed profile"
            );
            Ok(kwh)
        }
        None => Ok(vec![0.0; index.len()]),
    }
}

/// Runs independent scenarios against the same baseline, in order.
///
/// # Errors
///
/// Stops at the first scenario that fails.
pub fn run_many(baseline: &CanonicalSeries, scenarios: &[Scenario]) -> Result<Vec<ScenarioResult>> {
    scenarios.iter().map(|s| s.run(baseline)).collect()
}
