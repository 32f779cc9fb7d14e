//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone};
use chrono_tz::Tz;

use meter_scenario::canon::{CanonicalSeries, DEFAULT_TZ, Flow};
use meter_scenario::devices::BaseLoad;

/// Default meter identifier used by the fixtures.
pub const METER: &str = "Q1234567890";

/// Half-hourly index starting at local midnight on Monday 2025-01-06 (Brisbane).
pub fn half_hour_index(days: i64) -> Vec<DateTime<Tz>> {
    let start = DEFAULT_TZ.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
    (0..days * 48)
        .map(|i| start + Duration::minutes(30 * i))
        .collect()
}

/// Flat import series: `kwh` on every half-hour.
pub fn flat_import(days: i64, kwh: f64) -> CanonicalSeries {
    let idx = half_hour_index(days);
    CanonicalSeries::from_dense(
        DEFAULT_TZ,
        &idx,
        &vec![kwh; idx.len()],
        METER,
        "E1",
        Flow::GridImport,
        30,
    )
}

/// Flat import plus a controlled-load channel and some midday export.
pub fn mixed_flows(days: i64) -> CanonicalSeries {
    let idx = half_hour_index(days);
    let mut series = flat_import(days, 0.5);
    series.extend(CanonicalSeries::from_dense(
        DEFAULT_TZ,
        &idx,
        &vec![0.1; idx.len()],
        METER,
        "E2",
        Flow::ControlledLoadImport,
        30,
    ));
    let noon: Vec<_> = idx
        .iter()
        .copied()
        .enumerate()
        .filter(|(i, _)| (i % 48) >= 22 && (i % 48) < 28)
        .map(|(_, ts)| ts)
        .collect();
    series.extend(CanonicalSeries::from_dense(
        DEFAULT_TZ,
        &noon,
        &vec![0.3; noon.len()],
        METER,
        "B1",
        Flow::GridExportSolar,
        30,
    ));
    series
}

/// Seeded synthetic household over `days` days.
pub fn synthetic(days: u32) -> CanonicalSeries {
    BaseLoad {
        days,
        meter_id: METER.to_string(),
        ..BaseLoad::default()
    }
    .to_series()
    .unwrap()
}
