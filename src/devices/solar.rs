use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::devices::types::IntervalProfile;
use crate::error::Result;

/// Local hour at which the generation shape rises from zero.
pub const DAYLIGHT_START_HOUR: f64 = 6.0;
/// Local hour at which the generation shape returns to zero.
pub const DAYLIGHT_END_HOUR: f64 = 18.0;
/// Sharpens the half-sine towards a clear-sky irradiance curve.
pub const SHAPE_EXPONENT: f64 = 1.2;

/// Rooftop solar PV system.
///
/// Generation follows a fixed clear-sky shape on local wall-clock time,
/// scaled by the DC nameplate, reduced by system losses, clipped at the
/// inverter's AC limit, and optionally scaled per calendar month.
///
/// A non-positive `system_kwp` or `inverter_kw` disables generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PvConfig {
    /// DC nameplate capacity (kWp).
    pub system_kwp: f64,
    /// Inverter AC output limit (kW).
    pub inverter_kw: f64,
    /// Wiring, soiling and temperature losses as a fraction (0.0–1.0).
    #[serde(default = "default_loss_fraction")]
    pub loss_fraction: f64,
    /// Multipliers keyed by two-digit month (`"01"`..`"12"`); missing months use 1.0.
    #[serde(default)]
    pub seasonal_scale: Option<BTreeMap<String, f64>>,
}

fn default_loss_fraction() -> f64 {
    0.15
}

impl PvConfig {
    /// Creates a PV system with default losses and no seasonal scaling.
    pub fn new(system_kwp: f64, inverter_kw: f64) -> Self {
        Self {
            system_kwp,
            inverter_kw,
            loss_fraction: default_loss_fraction(),
            seasonal_scale: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.system_kwp > 0.0 && self.inverter_kw > 0.0
    }

    /// Multiplier for a calendar month (1-based).
    pub fn seasonal_multiplier(&self, month: u32) -> f64 {
        self.seasonal_scale
            .as_ref()
            .and_then(|scale| scale.get(&format!("{month:02}")).copied())
            .unwrap_or(1.0)
    }

    /// AC output (kW) for a shape value in a given month.
    ///
    /// The inverter limit applies both before and after seasonal scaling, so
    /// a multiplier above 1.0 never pushes output past the AC rating.
    ///
    /// Returns 0.0 for a non-positive shape and whenever any factor is
    /// non-finite.
    pub fn ac_kw(&self, shape: f64, month: u32) -> f64 {
        let mult = self.seasonal_multiplier(month);
        let factors = [shape, self.system_kwp, self.loss_fraction, self.inverter_kw, mult];
        if !(shape > 0.0) || factors.iter().any(|f| !f.is_finite()) {
            return 0.0;
        }
        let dc_after_losses = shape * self.system_kwp * (1.0 - self.loss_fraction);
        let clipped = dc_after_losses.min(self.inverter_kw);
        (clipped * mult).min(self.inverter_kw).max(0.0)
    }

    /// Checks ranges that cannot mean "disabled".
    pub fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if !self.system_kwp.is_finite() {
            errors.push(ConfigError::new(format!("{prefix}.system_kwp"), "must be finite"));
        }
        if !self.inverter_kw.is_finite() {
            errors.push(ConfigError::new(format!("{prefix}.inverter_kw"), "must be finite"));
        }
        if !(0.0..=1.0).contains(&self.loss_fraction) {
            errors.push(ConfigError::new(
                format!("{prefix}.loss_fraction"),
                "must be in [0.0, 1.0]",
            ));
        }
        if let Some(scale) = &self.seasonal_scale {
            for (month, mult) in scale {
                let month_ok = month.len() == 2
                    && month.parse::<u32>().is_ok_and(|m| (1..=12).contains(&m));
                if !month_ok {
                    errors.push(ConfigError::new(
                        format!("{prefix}.seasonal_scale.{month}"),
                        "month key must be \"01\"..\"12\"",
                    ));
                }
                if !mult.is_finite() || *mult < 0.0 {
                    errors.push(ConfigError::new(
                        format!("{prefix}.seasonal_scale.{month}"),
                        "multiplier must be finite and >= 0",
                    ));
                }
            }
        }
        errors
    }
}

/// Normalized generation shape (0..1) for one local timestamp.
///
/// Zero outside 06:00–18:00 local wall time; inside it follows
/// `sin(π · (hour − 6) / 12) ^ 1.2`, peaking at 12:00.
pub fn pv_shape(ts: &DateTime<Tz>) -> f64 {
    let hours = f64::from(ts.hour()) + f64::from(ts.minute()) / 60.0;
    if hours <= DAYLIGHT_START_HOUR || hours >= DAYLIGHT_END_HOUR {
        return 0.0;
    }
    let x = (hours - DAYLIGHT_START_HOUR) / (DAYLIGHT_END_HOUR - DAYLIGHT_START_HOUR)
        * std::f64::consts::PI;
    x.sin().max(0.0).powf(SHAPE_EXPONENT)
}

/// Shape values for a whole index.
///
/// Timestamps carry their zone, so the shape always follows true local wall
/// time (including DST shifts); naive timestamps are rejected where series
/// are built (see [`crate::io::import`]).
pub fn normalized_pv_shape(index: &[DateTime<Tz>]) -> Vec<f64> {
    index.iter().map(pv_shape).collect()
}

impl IntervalProfile for PvConfig {
    /// Per-interval AC energy at the meter (kWh).
    fn energy_kwh(&self, index: &[DateTime<Tz>], interval_hours: f64) -> Result<Vec<f64>> {
        if !self.is_enabled() {
            return Ok(vec![0.0; index.len()]);
        }
        Ok(index
            .iter()
            .map(|ts| self.ac_kw(pv_shape(ts), ts.month()) * interval_hours)
            .collect())
    }

    fn device_type(&self) -> &'static str {
        "SolarPV"
    }
}
