//! Integration tests for the scenario pipeline over realistic baselines.

mod common;

use approx::assert_abs_diff_eq;
use chrono::Timelike;

use meter_scenario::Error;
use meter_scenario::canon::{DEFAULT_TZ, Flow};
use meter_scenario::config::{ScenarioConfig, residential_tou_plan};
use meter_scenario::devices::{BatteryConfig, EvConfig, EvStrategy, PvConfig, dispatch};
use meter_scenario::sim::clock::{DayFilter, TimeOfDay};
use meter_scenario::sim::{Scenario, run_many};
use meter_scenario::tariff::{DemandCharge, TariffPlan};

fn at(h: u32) -> TimeOfDay {
    TimeOfDay::from_minutes(h * 60)
}

#[test]
fn null_scenario_is_idempotent_on_synthetic_household() {
    let baseline = common::synthetic(7);
    let result = Scenario::default().run(&baseline).unwrap();

    assert_eq!(result.after.len(), baseline.len());
    for (a, b) in result.after.records().iter().zip(baseline.records()) {
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(a.flow, b.flow);
        assert_abs_diff_eq!(a.energy_kwh, b.energy_kwh, epsilon = 1e-12);
    }
    assert_abs_diff_eq!(result.delta.import_kwh_delta, 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.delta.export_kwh_delta, 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.delta.total_kwh_delta, 0.0, epsilon = 1e-9);
    assert_eq!(result.summary_before, result.summary_after);
}

#[test]
fn null_scenario_merges_import_channels() {
    let baseline = common::mixed_flows(2);
    let result = Scenario::default().run(&baseline).unwrap();

    // E1 and E2 collapse onto one import row; exports land on B1.
    assert!(result.after.flows().iter().all(|f| *f != Flow::ControlledLoadImport));
    assert_eq!(result.after.channels(), vec!["B1", "E1"]);
    assert_abs_diff_eq!(result.delta.import_kwh_delta, 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.delta.export_kwh_delta, 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.trace[0].baseline_import_kwh, 0.6, epsilon = 1e-12);
}

#[test]
fn concrete_evening_ev_adds_eight_kwh() {
    let scenario = Scenario {
        ev: Some(EvConfig {
            daily_kwh: 8.0,
            max_kw: 7.0,
            window_start: at(18),
            window_end: at(22),
            days: DayFilter::All,
            strategy: EvStrategy::Immediate,
        }),
        ..Scenario::default()
    };
    let result = scenario.run(&common::flat_import(1, 0.5)).unwrap();

    let charged: Vec<f64> = result.trace.iter().map(|t| t.ev_kwh).collect();
    for (i, t) in result.trace.iter().enumerate() {
        if !(36..44).contains(&i) {
            assert_eq!(charged[i], 0.0, "no charging outside the window at {}", t.timestamp);
        }
    }
    assert_eq!(&charged[36..39], &[3.5, 3.5, 1.0]);
    assert_abs_diff_eq!(result.explain.ev_kwh, 8.0, epsilon = 1e-12);
    assert_abs_diff_eq!(result.after.import_kwh(), 32.0, epsilon = 1e-9);
}

#[test]
fn concrete_pv_noon_is_inverter_clipped() {
    let scenario = Scenario {
        pv: Some(PvConfig::new(6.6, 5.0)),
        ..Scenario::default()
    };
    let result = scenario.run(&common::flat_import(1, 0.5)).unwrap();
    let noon = result
        .trace
        .iter()
        .find(|t| t.timestamp.hour() == 12 && t.timestamp.minute() == 0)
        .unwrap();
    assert_abs_diff_eq!(noon.pv_kwh, 2.5, epsilon = 1e-12);
    for t in &result.trace {
        assert!(t.pv_kwh >= 0.0 && t.pv_kwh <= 2.5 + 1e-12);
    }
}

#[test]
fn concrete_battery_stays_within_bounds() {
    let cfg = BatteryConfig::new(10.0, 5.0);
    let import = vec![0.6; 48];
    let excess: Vec<f64> = (0..48).map(|i| if i % 6 == 0 { 0.4 } else { 0.0 }).collect();
    let out = dispatch(&cfg, import.clone(), excess.clone(), 0.5);

    for i in 0..48 {
        assert!(out.soc_kwh[i] >= 1.0 - 1e-9 && out.soc_kwh[i] <= 9.5 + 1e-9);
        assert!(out.charge_kwh[i] >= 0.0 && out.charge_kwh[i] <= 2.5 + 1e-9);
        assert!(out.discharge_kwh[i] >= 0.0 && out.discharge_kwh[i] <= 2.5 + 1e-9);
        if excess[i] == 0.0 {
            assert_eq!(out.charge_kwh[i], 0.0);
        }
        assert_abs_diff_eq!(out.import_after_kwh[i], import[i] - out.discharge_kwh[i]);
    }
    assert_abs_diff_eq!(out.total_charge_kwh(), 3.2, epsilon = 1e-9);
    assert_abs_diff_eq!(out.total_discharge_kwh(), 2.88, epsilon = 1e-9);
}

#[test]
fn full_preset_conserves_energy_per_interval() {
    let cfg = ScenarioConfig::full();
    let result = cfg.scenario().run(&common::mixed_flows(7)).unwrap();
    let battery = cfg.battery.as_ref().unwrap();

    for t in &result.trace {
        let load = t.baseline_import_kwh + t.ev_kwh;
        assert_eq!(load - t.pv_used_kwh, t.import_before_battery_kwh);
        assert_eq!(
            t.baseline_export_kwh + t.pv_excess_kwh,
            t.export_before_battery_kwh
        );
        assert_abs_diff_eq!(
            t.import_before_battery_kwh - t.battery_discharge_kwh,
            t.import_after_kwh,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            t.export_before_battery_kwh - t.battery_charge_kwh,
            t.export_after_kwh,
            epsilon = 1e-12
        );
        assert!(t.battery_soc_kwh >= battery.soc_min_kwh() - 1e-9);
        assert!(t.battery_soc_kwh <= battery.soc_max_kwh() + 1e-9);
    }

    let after_import: f64 = result.trace.iter().map(|t| t.import_after_kwh).sum();
    assert_abs_diff_eq!(after_import, result.after.import_kwh(), epsilon = 1e-9);
    assert_abs_diff_eq!(
        result.delta.import_kwh_delta,
        result.after.import_kwh() - result.before.import_kwh(),
        epsilon = 1e-9
    );
}

#[test]
fn battery_lowers_evening_cost_on_tou_plan() {
    let solar = ScenarioConfig::solar().scenario();
    let solar_battery = ScenarioConfig::solar_battery().scenario();
    let baseline = common::synthetic(14);

    let results = run_many(&baseline, &[solar, solar_battery]).unwrap();
    let solar_delta = results[0].delta.cost_total_delta.unwrap();
    let battery_delta = results[1].delta.cost_total_delta.unwrap();
    assert!(solar_delta < 0.0);
    assert!(battery_delta < solar_delta);
    assert!(results[1].explain.battery_cycles_est > 0.0);
}

#[test]
fn demand_charge_falls_when_battery_covers_the_peak() {
    let mut plan = residential_tou_plan();
    plan.demand = Some(DemandCharge {
        window_start: at(16),
        window_end: at(21),
        days: DayFilter::All,
        rate_per_kw_per_month: 10.0,
    });
    let scenario = Scenario {
        pv: Some(PvConfig::new(6.6, 5.0)),
        battery: Some(BatteryConfig::new(13.5, 5.0)),
        tariff: Some(plan),
        ..Scenario::default()
    };
    let result = scenario.run(&common::flat_import(3, 0.5)).unwrap();
    let before = result.cost_before.as_ref().unwrap();
    let after = result.cost_after.as_ref().unwrap();

    assert_abs_diff_eq!(before.rows[0].demand_kw, 1.0, epsilon = 1e-12);
    assert!(after.rows[0].demand_kw < before.rows[0].demand_kw);
    assert!(after.rows[0].demand_cost < before.rows[0].demand_cost);
}

#[test]
fn cost_rows_follow_calendar_months() {
    let scenario = Scenario {
        tariff: Some(TariffPlan::flat(30.0, 100.0, 0.0)),
        ..Scenario::default()
    };
    // 2025-01-06 plus 30 days runs into February.
    let result = scenario.run(&common::flat_import(30, 0.5)).unwrap();
    let cost = result.cost_before.unwrap();
    let months: Vec<&str> = cost.rows.iter().map(|r| r.month.as_str()).collect();
    assert_eq!(months, vec!["2025-01", "2025-02"]);
    assert_abs_diff_eq!(cost.rows[0].fixed_cost, 31.0, epsilon = 1e-9);
    assert_abs_diff_eq!(cost.rows[1].fixed_cost, 28.0, epsilon = 1e-9);
    // 26 January days at 24 kWh and 30c.
    assert_abs_diff_eq!(cost.rows[0].energy_cost, 26.0 * 24.0 * 0.30, epsilon = 1e-9);
}

#[test]
fn unvalidated_library_configs_never_run() {
    let mut lossy = PvConfig::new(6.6, 5.0);
    lossy.loss_fraction = f64::NAN;
    let mut dark_january = PvConfig::new(6.6, 5.0);
    dark_january.seasonal_scale = Some([("01".to_string(), f64::NAN)].into_iter().collect());
    let mut inverted = BatteryConfig::new(10.0, 5.0);
    inverted.soc_min = 0.8;
    inverted.soc_max = 0.2;

    let baseline = common::flat_import(1, 0.5);
    let scenarios = [
        Scenario {
            pv: Some(lossy),
            ..Scenario::default()
        },
        Scenario {
            pv: Some(dark_january),
            ..Scenario::default()
        },
        Scenario {
            battery: Some(inverted),
            ..Scenario::default()
        },
    ];
    for scenario in scenarios {
        let err = scenario.run(&baseline).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err}");
    }
}

#[test]
fn multi_meter_input_must_be_filtered_first() {
    let mut series = common::flat_import(1, 0.5);
    let other = meter_scenario::canon::CanonicalSeries::from_dense(
        DEFAULT_TZ,
        &common::half_hour_index(1),
        &[0.2; 48],
        "Q999",
        "E1",
        Flow::GridImport,
        30,
    );
    series.extend(other);

    let err = Scenario::default().run(&series).unwrap_err();
    assert!(matches!(err, Error::MultipleMeters { count: 2, .. }));

    let filtered = series.for_meter(common::METER);
    assert!(Scenario::default().run(&filtered).is_ok());
}

#[test]
fn sydney_baseline_runs_across_dst_change() {
    let cfg = ScenarioConfig::from_toml_file(std::path::Path::new("scenarios/full.toml")).unwrap();
    assert!(cfg.validate().is_empty());
    let baseline = cfg.baseline.to_series().unwrap();
    let result = cfg.scenario().run(&baseline).unwrap();

    // 28 days of 15-minute intervals plus the repeated hour on 2025-04-06.
    assert_eq!(result.intervals(), 28 * 96 + 4);
    assert_eq!(result.summary_before.meta.cadence_min, 15);
    assert!(result.explain.ev_kwh > 0.0);
    assert!(result.explain.pv_kwh > 0.0);

    let cycles = result.cycle_cost_after.as_ref().unwrap();
    let labels: Vec<&str> = cycles.rows.iter().map(|r| r.cycle.as_str()).collect();
    assert_eq!(labels, vec!["2025-03-24..2025-04-06", "2025-04-07..2025-04-20"]);
    assert!(cycles.rows.iter().all(|r| r.days_in_cycle == 14 && r.gst > 0.0));
    // The seasonal rollup sees only autumn in Sydney.
    assert_eq!(result.summary_before.seasons.len(), 1);
    assert_eq!(result.summary_before.months.len(), 2);
}
