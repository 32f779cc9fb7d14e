//! Retail tariff pricing: time-of-use energy bands, an optional monthly
//! demand charge, a daily supply charge and a solar feed-in credit.
//!
//! Series are priced either per calendar month or per explicit billing
//! cycle; cycle bills also carry the pay-on-time discount and GST lines of a
//! retail invoice.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Datelike, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};

use crate::canon::{CanonicalSeries, IntervalRecord};
use crate::config::ConfigError;
use crate::error::{Error, Result};
use crate::sim::clock::{DayFilter, TimeOfDay, TimeWindow};

/// A named time-of-use band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TouBand {
    pub name: String,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    /// Energy rate in cents per kWh.
    pub rate_c_per_kwh: f64,
}

impl TouBand {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

/// Monthly demand charge on the highest in-window import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemandCharge {
    #[serde(default = "default_demand_start")]
    pub window_start: TimeOfDay,
    #[serde(default = "default_demand_end")]
    pub window_end: TimeOfDay,
    #[serde(default = "default_demand_days")]
    pub days: DayFilter,
    /// Dollars per kW of monthly peak.
    pub rate_per_kw_per_month: f64,
}

fn default_demand_start() -> TimeOfDay {
    TimeOfDay::from_minutes(16 * 60)
}

fn default_demand_end() -> TimeOfDay {
    TimeOfDay::from_minutes(21 * 60)
}

fn default_demand_days() -> DayFilter {
    DayFilter::Weekdays
}

impl DemandCharge {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.window_start, self.window_end)
    }
}

/// A retail electricity plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TariffPlan {
    /// Bands are applied in order; where they overlap the last one wins.
    pub usage_bands: Vec<TouBand>,
    /// Daily supply charge in cents.
    #[serde(default)]
    pub fixed_c_per_day: f64,
    /// Export credit in cents per kWh.
    #[serde(default)]
    pub feed_in_c_per_kwh: f64,
    #[serde(default)]
    pub demand: Option<DemandCharge>,
}

impl TariffPlan {
    /// One all-day band at a single rate.
    pub fn flat(rate_c_per_kwh: f64, fixed_c_per_day: f64, feed_in_c_per_kwh: f64) -> Self {
        Self {
            usage_bands: vec![TouBand {
                name: "anytime".to_string(),
                start: TimeOfDay::MIDNIGHT,
                end: TimeOfDay::END_OF_DAY,
                rate_c_per_kwh,
            }],
            fixed_c_per_day,
            feed_in_c_per_kwh,
            demand: None,
        }
    }

    /// Band covering a local time of day, if any.
    fn band_for(&self, seconds: u32) -> Option<&TouBand> {
        self.usage_bands
            .iter()
            .rev()
            .find(|b| b.window().contains_seconds(seconds))
    }

    pub fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.usage_bands.is_empty() {
            errors.push(ConfigError::new(
                format!("{prefix}.usage_bands"),
                "at least one band is required",
            ));
        }
        let mut names = BTreeSet::new();
        for (i, b) in self.usage_bands.iter().enumerate() {
            if b.name.trim().is_empty() || !names.insert(b.name.as_str()) {
                errors.push(ConfigError::new(
                    format!("{prefix}.usage_bands[{i}].name"),
                    "must be non-empty and unique",
                ));
            }
            if !b.rate_c_per_kwh.is_finite() {
                errors.push(ConfigError::new(
                    format!("{prefix}.usage_bands[{i}].rate_c_per_kwh"),
                    "must be finite",
                ));
            }
        }
        for (field, value) in [
            ("fixed_c_per_day", self.fixed_c_per_day),
            ("feed_in_c_per_kwh", self.feed_in_c_per_kwh),
        ] {
            if !value.is_finite() {
                errors.push(ConfigError::new(format!("{prefix}.{field}"), "must be finite"));
            }
        }
        if let Some(d) = &self.demand {
            if !d.rate_per_kw_per_month.is_finite() {
                errors.push(ConfigError::new(
                    format!("{prefix}.demand.rate_per_kw_per_month"),
                    "must be finite",
                ));
            }
        }
        errors
    }
}

/// Billables and costs for one calendar month (dollars).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostRow {
    /// `YYYY-MM` in local time.
    pub month: String,
    /// Import kWh per band; import outside every band is not priced.
    pub band_kwh: BTreeMap<String, f64>,
    pub unassigned_kwh: f64,
    pub export_kwh: f64,
    pub demand_kw: f64,
    pub days_in_month: u32,
    pub energy_cost: f64,
    pub demand_cost: f64,
    pub fixed_cost: f64,
    /// Negative: credit for exported energy.
    pub feed_in_credit: f64,
    pub total: f64,
}

/// Monthly cost table, ordered by month.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostTable {
    pub rows: Vec<CostRow>,
}

impl CostTable {
    /// Sum of the `total` column.
    pub fn total(&self) -> f64 {
        self.rows.iter().map(|r| r.total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for CostTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<8} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "month", "energy", "demand", "fixed", "feed-in", "total"
        )?;
        for r in &self.rows {
            writeln!(
                f,
                "{:<8} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
                r.month, r.energy_cost, r.demand_cost, r.fixed_cost, r.feed_in_credit, r.total
            )?;
        }
        write!(f, "{:<8} {:>54.2}", "total", self.total())
    }
}

/// Explicit billing cycles plus the adjustments printed on each bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BillingOptions {
    /// `(first, last)` local dates, both inclusive.
    pub cycles: Vec<(NaiveDate, NaiveDate)>,
    /// Fraction (0..1) taken off energy, demand and supply charges.
    pub pay_on_time_discount: f64,
    pub include_gst: bool,
    pub gst_rate: f64,
}

impl Default for BillingOptions {
    fn default() -> Self {
        Self {
            cycles: Vec::new(),
            pay_on_time_discount: 0.0,
            include_gst: false,
            gst_rate: 0.10,
        }
    }
}

impl BillingOptions {
    /// Billing over the given cycles with no discount and no GST.
    pub fn new(cycles: Vec<(NaiveDate, NaiveDate)>) -> Self {
        Self {
            cycles,
            ..Self::default()
        }
    }

    pub fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = check_cycles(&self.cycles, &format!("{prefix}.cycles"));
        if !(0.0..=1.0).contains(&self.pay_on_time_discount) {
            errors.push(ConfigError::new(
                format!("{prefix}.pay_on_time_discount"),
                "must be in [0.0, 1.0]",
            ));
        }
        if !(self.gst_rate.is_finite() && self.gst_rate >= 0.0) {
            errors.push(ConfigError::new(
                format!("{prefix}.gst_rate"),
                "must be finite and >= 0",
            ));
        }
        errors
    }
}

/// End before start, or two cycles sharing a day.
fn check_cycles(cycles: &[(NaiveDate, NaiveDate)], field: &str) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    for (i, (first, last)) in cycles.iter().enumerate() {
        if last < first {
            errors.push(ConfigError::new(
                format!("{field}[{i}]"),
                format!("cycle ends {last} before it starts {first}"),
            ));
        }
    }
    let mut sorted: Vec<&(NaiveDate, NaiveDate)> = cycles.iter().collect();
    sorted.sort();
    for pair in sorted.windows(2) {
        if pair[1].0 <= pair[0].1 {
            errors.push(ConfigError::new(
                field,
                format!("cycles starting {} and {} overlap", pair[0].0, pair[1].0),
            ));
        }
    }
    errors
}

/// Billables and costs for one billing cycle (dollars).
///
/// The discount and GST are rounded to cents the way an invoice prints them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleCostRow {
    /// `first..last`, both inclusive.
    pub cycle: String,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub days_in_cycle: u32,
    pub band_kwh: BTreeMap<String, f64>,
    pub unassigned_kwh: f64,
    pub export_kwh: f64,
    pub demand_kw: f64,
    pub energy_cost: f64,
    pub demand_cost: f64,
    pub fixed_cost: f64,
    /// Negative: credit for exported energy.
    pub feed_in_credit: f64,
    /// Negative: taken off the charges, never off the feed-in credit.
    pub pay_on_time_discount: f64,
    pub gst: f64,
    pub total: f64,
}

/// Cycle cost table, ordered by first day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleCostTable {
    pub rows: Vec<CycleCostRow>,
}

impl CycleCostTable {
    pub fn total(&self) -> f64 {
        self.rows.iter().map(|r| r.total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for CycleCostTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<22} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "cycle", "energy", "demand", "fixed", "feed-in", "discount", "gst", "total"
        )?;
        for r in &self.rows {
            writeln!(
                f,
                "{:<22} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
                r.cycle,
                r.energy_cost,
                r.demand_cost,
                r.fixed_cost,
                r.feed_in_credit,
                r.pay_on_time_discount,
                r.gst,
                r.total
            )?;
        }
        write!(f, "{:<22} {:>76.2}", "total", self.total())
    }
}

/// Usage, export and demand intervals gathered for one billing period.
#[derive(Default)]
struct BillAccumulator {
    band_kwh: BTreeMap<String, f64>,
    unassigned_kwh: f64,
    export_kwh: f64,
    /// Import per interval start inside the demand window.
    demand_intervals: BTreeMap<i64, (f64, u32)>,
}

/// Period charges before any invoice adjustment.
struct Charges {
    demand_kw: f64,
    energy_cost: f64,
    demand_cost: f64,
    feed_in_credit: f64,
}

impl BillAccumulator {
    fn add(&mut self, plan: &TariffPlan, r: &IntervalRecord) {
        let ts = r.timestamp;
        if r.flow.is_export() {
            self.export_kwh += r.energy_kwh;
            return;
        }
        match plan.band_for(ts.num_seconds_from_midnight()) {
            Some(band) => *self.band_kwh.entry(band.name.clone()).or_insert(0.0) += r.energy_kwh,
            None => self.unassigned_kwh += r.energy_kwh,
        }
        if let Some(d) = &plan.demand {
            if d.days.matches(&ts) && d.window().contains(&ts) {
                let slot = self
                    .demand_intervals
                    .entry(ts.timestamp())
                    .or_insert((0.0, r.interval_minutes));
                slot.0 += r.energy_kwh;
            }
        }
    }

    fn charges(&self, plan: &TariffPlan) -> Charges {
        let energy_cost = plan
            .usage_bands
            .iter()
            .map(|b| self.band_kwh.get(&b.name).copied().unwrap_or(0.0) * b.rate_c_per_kwh / 100.0)
            .sum();
        let demand_kw = self
            .demand_intervals
            .values()
            .map(|&(kwh, cadence)| kwh * 60.0 / f64::from(cadence.max(1)))
            .fold(0.0, f64::max);
        let demand_cost = plan
            .demand
            .as_ref()
            .map_or(0.0, |d| demand_kw * d.rate_per_kw_per_month);
        Charges {
            demand_kw,
            energy_cost,
            demand_cost,
            feed_in_credit: -self.export_kwh * plan.feed_in_c_per_kwh / 100.0,
        }
    }
}

/// Prices a series month by month.
///
/// Every import flow is priced through the usage bands. Demand is the
/// highest in-window interval import converted to kW (`kWh × 60 / cadence`).
/// The supply charge is applied for every day of each month that has data.
pub fn estimate_monthly_cost(series: &CanonicalSeries, plan: &TariffPlan) -> CostTable {
    let mut months: BTreeMap<(i32, u32), BillAccumulator> = BTreeMap::new();
    for r in series.records() {
        let ts = r.timestamp;
        months.entry((ts.year(), ts.month())).or_default().add(plan, r);
    }

    let rows = months
        .into_iter()
        .map(|((year, month), acc)| {
            let charges = acc.charges(plan);
            let days_in_month = days_in_month(year, month);
            let fixed_cost = plan.fixed_c_per_day / 100.0 * f64::from(days_in_month);
            CostRow {
                month: format!("{year:04}-{month:02}"),
                band_kwh: acc.band_kwh,
                unassigned_kwh: acc.unassigned_kwh,
                export_kwh: acc.export_kwh,
                demand_kw: charges.demand_kw,
                days_in_month,
                energy_cost: charges.energy_cost,
                demand_cost: charges.demand_cost,
                fixed_cost,
                feed_in_credit: charges.feed_in_credit,
                total: charges.energy_cost + charges.demand_cost + fixed_cost + charges.feed_in_credit,
            }
        })
        .collect();

    CostTable { rows }
}

/// Prices a series over explicit billing cycles.
///
/// Each record belongs to the cycle whose local dates contain it; records
/// outside every cycle are not billed, and a cycle without records gets no
/// row. Demand is the cycle's highest in-window interval. The supply charge
/// covers every day of the cycle.
///
/// # Arguments
///
/// * `series` - Canonical series to price
/// * `plan` - Tariff to apply
/// * `billing` - Cycles (in any order) plus pay-on-time discount and GST
///
/// # Returns
///
/// One row per billed cycle, ordered by first day. The discount applies to
/// energy, demand and supply charges (rounded to cents), GST to what remains
/// of them after the discount; the feed-in credit is neither discounted nor
/// taxed.
///
/// # Errors
///
/// Returns [`Error::Config`] with the first problem
/// [`BillingOptions::validate`] reports, such as a cycle ending before it
/// starts or two cycles sharing a day.
pub fn estimate_cycle_costs(
    series: &CanonicalSeries,
    plan: &TariffPlan,
    billing: &BillingOptions,
) -> Result<CycleCostTable> {
    if let Some(first) = billing.validate("billing").into_iter().next() {
        return Err(Error::Config(first));
    }
    let mut ordered: Vec<(NaiveDate, NaiveDate)> = billing.cycles.clone();
    ordered.sort();

    let mut billed: BTreeMap<usize, BillAccumulator> = BTreeMap::new();
    for r in series.records() {
        let day = r.timestamp.date_naive();
        let idx = ordered.partition_point(|(first, _)| *first <= day);
        if let Some(i) = idx.checked_sub(1).filter(|&i| day <= ordered[i].1) {
            billed.entry(i).or_default().add(plan, r);
        }
    }

    let rows = billed
        .into_iter()
        .map(|(i, acc)| {
            let (first_day, last_day) = ordered[i];
            let days_in_cycle = u32::try_from((last_day - first_day).num_days() + 1).unwrap_or(0);
            let charges = acc.charges(plan);
            let fixed_cost = plan.fixed_c_per_day / 100.0 * f64::from(days_in_cycle);

            let charges_only = round_cents(charges.energy_cost + charges.demand_cost + fixed_cost);
            let pay_on_time_discount = -round_cents(charges_only * billing.pay_on_time_discount);
            let gst = if billing.include_gst {
                round_cents((charges_only + pay_on_time_discount).max(0.0) * billing.gst_rate)
            } else {
                0.0
            };
            let subtotal =
                charges.energy_cost + charges.demand_cost + fixed_cost + charges.feed_in_credit;
            CycleCostRow {
                cycle: format!("{first_day}..{last_day}"),
                first_day,
                last_day,
                days_in_cycle,
                band_kwh: acc.band_kwh,
                unassigned_kwh: acc.unassigned_kwh,
                export_kwh: acc.export_kwh,
                demand_kw: charges.demand_kw,
                energy_cost: charges.energy_cost,
                demand_cost: charges.demand_cost,
                fixed_cost,
                feed_in_credit: charges.feed_in_credit,
                pay_on_time_discount,
                gst,
                total: subtotal + pay_on_time_discount + gst,
            }
        })
        .collect();

    Ok(CycleCostTable { rows })
}

fn round_cents(dollars: f64) -> f64 {
    (dollars * 100.0).round() / 100.0
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match (first, next) {
        (Some(a), Some(b)) => u32::try_from((b - a).num_days()).unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::{DEFAULT_TZ, Flow, IntervalRecord};
    use approx::assert_abs_diff_eq;
    use chrono::{DateTime, Duration, TimeZone};
    use chrono_tz::Tz;

    fn day_index(y: i32, m: u32, d: u32) -> Vec<DateTime<Tz>> {
        let start = DEFAULT_TZ.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap();
        (0..48).map(|i| start + Duration::minutes(30 * i)).collect()
    }

    fn tou_plan() -> TariffPlan {
        TariffPlan {
            usage_bands: vec![
                TouBand {
                    name: "offpeak".to_string(),
                    start: TimeOfDay::MIDNIGHT,
                    end: TimeOfDay::END_OF_DAY,
                    rate_c_per_kwh: 20.0,
                },
                TouBand {
                    name: "peak".to_string(),
                    start: TimeOfDay::parse("16:00").unwrap(),
                    end: TimeOfDay::parse("21:00").unwrap(),
                    rate_c_per_kwh: 40.0,
                },
            ],
            fixed_c_per_day: 100.0,
            feed_in_c_per_kwh: 5.0,
            demand: None,
        }
    }

    #[test]
    fn flat_plan_prices_import_and_credits_export() {
        let idx = day_index(2025, 1, 15);
        let mut series = CanonicalSeries::from_dense(
            DEFAULT_TZ, &idx, &vec![0.5; 48], "Q1", "E1", Flow::GridImport, 30,
        );
        series.extend(CanonicalSeries::from_dense(
            DEFAULT_TZ, &idx[20..24], &[1.0; 4], "Q1", "B1", Flow::GridExportSolar, 30,
        ));
        let table = estimate_monthly_cost(&series, &TariffPlan::flat(30.0, 100.0, 10.0));
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.month, "2025-01");
        assert_eq!(row.days_in_month, 31);
        assert_abs_diff_eq!(row.energy_cost, 24.0 * 0.30, epsilon = 1e-9);
        assert_abs_diff_eq!(row.fixed_cost, 31.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row.feed_in_credit, -0.4, epsilon = 1e-9);
        assert_abs_diff_eq!(table.total(), 7.2 + 31.0 - 0.4, epsilon = 1e-9);
    }

    #[test]
    fn later_band_overrides_earlier_one() {
        let idx = day_index(2025, 2, 3);
        let series = CanonicalSeries::from_dense(
            DEFAULT_TZ, &idx, &vec![0.5; 48], "Q1", "E1", Flow::GridImport, 30,
        );
        let row = &estimate_monthly_cost(&series, &tou_plan()).rows[0];
        assert_abs_diff_eq!(row.band_kwh["peak"], 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row.band_kwh["offpeak"], 19.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row.energy_cost, 5.0 * 0.4 + 19.0 * 0.2, epsilon = 1e-9);
        assert_eq!(row.days_in_month, 28);
    }

    #[test]
    fn demand_uses_peak_in_window_interval() {
        // 2025-02-03 is a Monday.
        let idx = day_index(2025, 2, 3);
        let mut values = vec![0.5; 48];
        values[34] = 2.0; // 17:00, inside 16:00-21:00
        values[10] = 3.0; // 05:00, outside
        let series = CanonicalSeries::from_dense(
            DEFAULT_TZ, &idx, &values, "Q1", "E1", Flow::GridImport, 30,
        );
        let mut plan = tou_plan();
        plan.demand = Some(DemandCharge {
            window_start: default_demand_start(),
            window_end: default_demand_end(),
            days: DayFilter::Weekdays,
            rate_per_kw_per_month: 10.0,
        });
        let row = &estimate_monthly_cost(&series, &plan).rows[0];
        assert_abs_diff_eq!(row.demand_kw, 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(row.demand_cost, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn controlled_load_is_priced_too() {
        let ts = DEFAULT_TZ.with_ymd_and_hms(2025, 3, 1, 1, 0, 0).unwrap();
        let series = CanonicalSeries::new(
            DEFAULT_TZ,
            vec![IntervalRecord {
                timestamp: ts,
                meter_id: "Q1".to_string(),
                channel: "E2".to_string(),
                flow: Flow::ControlledLoadImport,
                energy_kwh: 2.0,
                interval_minutes: 30,
            }],
        );
        let table = estimate_monthly_cost(&series, &TariffPlan::flat(25.0, 0.0, 0.0));
        assert_abs_diff_eq!(table.rows[0].energy_cost, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn empty_series_costs_nothing() {
        let table = estimate_monthly_cost(&CanonicalSeries::empty(DEFAULT_TZ), &tou_plan());
        assert!(table.is_empty());
        assert_eq!(table.total(), 0.0);
    }

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    #[test]
    fn cycle_bill_applies_discount_then_gst() {
        // 2025-01-09 .. 2025-01-13; the 9th falls outside both cycles.
        let start = DEFAULT_TZ.with_ymd_and_hms(2025, 1, 9, 0, 0, 0).unwrap();
        let idx: Vec<_> = (0..5 * 48).map(|i| start + Duration::minutes(30 * i)).collect();
        let mut series = CanonicalSeries::from_dense(
            DEFAULT_TZ, &idx, &vec![0.5; idx.len()], "Q1", "E1", Flow::GridImport, 30,
        );
        series.extend(CanonicalSeries::from_dense(
            DEFAULT_TZ, &idx[68..72], &[1.0; 4], "Q1", "B1", Flow::GridExportSolar, 30,
        ));
        let billing = BillingOptions {
            cycles: vec![(date(1, 12), date(1, 20)), (date(1, 10), date(1, 11))],
            pay_on_time_discount: 0.1,
            include_gst: true,
            ..BillingOptions::default()
        };
        let table = estimate_cycle_costs(&series, &TariffPlan::flat(30.0, 100.0, 10.0), &billing).unwrap();
        assert_eq!(table.rows.len(), 2);

        let first = &table.rows[0];
        assert_eq!(first.cycle, "2025-01-10..2025-01-11");
        assert_eq!(first.days_in_cycle, 2);
        assert_abs_diff_eq!(first.energy_cost, 14.4, epsilon = 1e-9);
        assert_abs_diff_eq!(first.fixed_cost, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(first.feed_in_credit, -0.4, epsilon = 1e-9);
        assert_abs_diff_eq!(first.pay_on_time_discount, -1.64, epsilon = 1e-9);
        assert_abs_diff_eq!(first.gst, 1.48, epsilon = 1e-9);
        assert_abs_diff_eq!(first.total, 14.4 + 2.0 - 0.4 - 1.64 + 1.48, epsilon = 1e-9);

        // Only two days of data, but supply is charged for all nine.
        let second = &table.rows[1];
        assert_eq!(second.days_in_cycle, 9);
        assert_abs_diff_eq!(second.band_kwh["anytime"], 48.0, epsilon = 1e-9);
        assert_abs_diff_eq!(second.fixed_cost, 9.0, epsilon = 1e-9);
        assert_abs_diff_eq!(second.pay_on_time_discount, -2.34, epsilon = 1e-9);
        assert_abs_diff_eq!(second.gst, 2.11, epsilon = 1e-9);
        assert_abs_diff_eq!(table.total(), first.total + second.total, epsilon = 1e-12);
    }

    #[test]
    fn calendar_month_cycle_matches_monthly_estimate() {
        let idx = day_index(2025, 2, 3);
        let mut values = vec![0.5; 48];
        values[34] = 2.0;
        let series = CanonicalSeries::from_dense(
            DEFAULT_TZ, &idx, &values, "Q1", "E1", Flow::GridImport, 30,
        );
        let mut plan = tou_plan();
        plan.demand = Some(DemandCharge {
            window_start: default_demand_start(),
            window_end: default_demand_end(),
            days: DayFilter::Weekdays,
            rate_per_kw_per_month: 10.0,
        });
        let monthly = estimate_monthly_cost(&series, &plan);
        let cycles =
            estimate_cycle_costs(&series, &plan, &BillingOptions::new(vec![(date(2, 1), date(2, 28))]))
                .unwrap();
        let row = &cycles.rows[0];
        assert_eq!(row.days_in_cycle, monthly.rows[0].days_in_month);
        assert_abs_diff_eq!(row.demand_kw, 4.0, epsilon = 1e-9);
        assert_eq!(row.pay_on_time_discount, 0.0);
        assert_eq!(row.gst, 0.0);
        assert_abs_diff_eq!(cycles.total(), monthly.total(), epsilon = 1e-9);
    }

    #[test]
    fn malformed_cycles_are_rejected() {
        let series = CanonicalSeries::from_dense(
            DEFAULT_TZ, &day_index(2025, 1, 15), &vec![0.5; 48], "Q1", "E1", Flow::GridImport, 30,
        );
        let plan = TariffPlan::flat(30.0, 0.0, 0.0);
        for cycles in [
            vec![(date(1, 20), date(1, 10))],
            vec![(date(1, 1), date(1, 15)), (date(1, 15), date(1, 31))],
        ] {
            let err = estimate_cycle_costs(&series, &plan, &BillingOptions::new(cycles)).unwrap_err();
            assert!(matches!(err, Error::Config(ref e) if e.field.starts_with("billing.cycles")));
        }
        let bad_discount = BillingOptions {
            pay_on_time_discount: 1.5,
            ..BillingOptions::default()
        };
        assert_eq!(bad_discount.validate("billing")[0].field, "billing.pay_on_time_discount");
        assert!(estimate_cycle_costs(&series, &plan, &BillingOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn validate_flags_missing_bands() {
        let plan = TariffPlan {
            usage_bands: Vec::new(),
            ..TariffPlan::flat(1.0, 0.0, 0.0)
        };
        assert!(!plan.validate("tariff").is_empty());
        assert!(tou_plan().validate("tariff").is_empty());
    }
}
