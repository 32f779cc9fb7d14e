use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Lower and upper clamp on round-trip efficiency before taking its square root.
const MIN_ROUND_TRIP_EFF: f64 = 0.01;
const MAX_ROUND_TRIP_EFF: f64 = 0.999;

/// Static parameters of a behind-the-meter battery.
///
/// `allow_grid_charge` and `allow_export` are carried for future dispatch
/// strategies; the self-consumption dispatcher never charges from the grid
/// and never discharges into export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatteryConfig {
    /// Usable capacity (kWh).
    pub capacity_kwh: f64,
    /// Charge and discharge power limit (kW).
    pub max_kw: f64,
    #[serde(default = "default_round_trip_eff")]
    pub round_trip_eff: f64,
    /// Minimum state of charge as a fraction of capacity.
    #[serde(default = "default_soc_min")]
    pub soc_min: f64,
    /// Maximum state of charge as a fraction of capacity.
    #[serde(default = "default_soc_max")]
    pub soc_max: f64,
    #[serde(default)]
    pub allow_grid_charge: bool,
    #[serde(default)]
    pub allow_export: bool,
}

fn default_round_trip_eff() -> f64 {
    0.90
}

fn default_soc_min() -> f64 {
    0.10
}

fn default_soc_max() -> f64 {
    0.95
}

impl BatteryConfig {
    /// Creates a battery with default efficiency and SOC limits.
    pub fn new(capacity_kwh: f64, max_kw: f64) -> Self {
        Self {
            capacity_kwh,
            max_kw,
            round_trip_eff: default_round_trip_eff(),
            soc_min: default_soc_min(),
            soc_max: default_soc_max(),
            allow_grid_charge: false,
            allow_export: false,
        }
    }

    /// A non-positive capacity or power limit means "no battery".
    pub fn is_enabled(&self) -> bool {
        self.capacity_kwh > 0.0 && self.max_kw > 0.0
    }

    /// Per-leg efficiency: the square root of the clamped round-trip figure.
    pub fn leg_efficiency(&self) -> f64 {
        let eff = if self.round_trip_eff.is_finite() {
            self.round_trip_eff
        } else {
            default_round_trip_eff()
        };
        eff.clamp(MIN_ROUND_TRIP_EFF, MAX_ROUND_TRIP_EFF).sqrt()
    }

    pub fn soc_min_kwh(&self) -> f64 {
        self.soc_min * self.capacity_kwh
    }

    pub fn soc_max_kwh(&self) -> f64 {
        self.soc_max * self.capacity_kwh
    }

    pub fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if !self.capacity_kwh.is_finite() {
            errors.push(ConfigError::new(format!("{prefix}.capacity_kwh"), "must be finite"));
        }
        if !self.max_kw.is_finite() {
            errors.push(ConfigError::new(format!("{prefix}.max_kw"), "must be finite"));
        }
        if !(self.round_trip_eff > 0.0 && self.round_trip_eff <= 1.0) {
            errors.push(ConfigError::new(
                format!("{prefix}.round_trip_eff"),
                "must be in (0.0, 1.0]",
            ));
        }
        if !(0.0..=1.0).contains(&self.soc_min) {
            errors.push(ConfigError::new(format!("{prefix}.soc_min"), "must be in [0.0, 1.0]"));
        }
        if !(0.0..=1.0).contains(&self.soc_max) {
            errors.push(ConfigError::new(format!("{prefix}.soc_max"), "must be in [0.0, 1.0]"));
        }
        if self.soc_min > self.soc_max {
            errors.push(ConfigError::new(
                format!("{prefix}.soc_min"),
                "must be <= soc_max",
            ));
        }
        errors
    }
}

/// Energy moved by the battery in one interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryStep {
    /// kWh taken from PV excess.
    pub charge_kwh: f64,
    /// kWh delivered against import.
    pub discharge_kwh: f64,
    /// Stored energy after the interval (kWh).
    pub soc_kwh: f64,
}

/// A battery being dispatched for self-consumption.
///
/// Each interval first charges from PV excess only, then discharges against
/// import only. Each leg loses `sqrt(round_trip_eff)`, and stored energy stays
/// within `[soc_min, soc_max] × capacity`. The battery starts at `soc_min`.
#[derive(Debug, Clone)]
pub struct Battery {
    /// Stored energy (kWh).
    soc_kwh: f64,
    soc_min_kwh: f64,
    soc_max_kwh: f64,
    /// Power-limit energy cap per interval (kWh).
    step_cap_kwh: f64,
    leg_eff: f64,
}

impl Battery {
    /// Creates a battery at its minimum state of charge.
    ///
    /// # Arguments
    ///
    /// * `config` - Battery parameters
    /// * `interval_hours` - Duration of one interval in hours
    pub fn new(config: &BatteryConfig, interval_hours: f64) -> Self {
        let soc_min_kwh = config.soc_min_kwh().max(0.0);
        Self {
            soc_kwh: soc_min_kwh,
            soc_min_kwh,
            soc_max_kwh: config.soc_max_kwh().max(soc_min_kwh),
            step_cap_kwh: (config.max_kw * interval_hours).max(0.0),
            leg_eff: config.leg_efficiency(),
        }
    }

    pub fn soc_kwh(&self) -> f64 {
        self.soc_kwh
    }

    /// Stores as much of `excess_kwh` as power and headroom allow.
    ///
    /// # Returns
    ///
    /// kWh drawn from the excess (before charging losses)
    pub fn charge_from_excess(&mut self, excess_kwh: f64) -> f64 {
        let room = (self.soc_max_kwh - self.soc_kwh).max(0.0);
        let charge = excess_kwh
            .max(0.0)
            .min(self.step_cap_kwh)
            .min(room / self.leg_eff);
        self.soc_kwh = (self.soc_kwh + charge * self.leg_eff).min(self.soc_max_kwh);
        charge
    }

    /// Covers as much of `need_kwh` as power and stored energy allow.
    ///
    /// # Returns
    ///
    /// kWh delivered to the load (after discharging losses)
    pub fn discharge_to_import(&mut self, need_kwh: f64) -> f64 {
        let available = (self.soc_kwh - self.soc_min_kwh).max(0.0) * self.leg_eff;
        let discharge = need_kwh.max(0.0).min(self.step_cap_kwh).min(available);
        self.soc_kwh = (self.soc_kwh - discharge / self.leg_eff).max(self.soc_min_kwh);
        discharge
    }

    /// Runs one interval: charge first, then discharge.
    pub fn step(&mut self, import_kwh: f64, excess_kwh: f64) -> BatteryStep {
        let charge_kwh = self.charge_from_excess(excess_kwh);
        let discharge_kwh = self.discharge_to_import(import_kwh);
        BatteryStep {
            charge_kwh,
            discharge_kwh,
            soc_kwh: self.soc_kwh,
        }
    }
}

/// Result of dispatching a battery over a whole series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    pub discharge_kwh: Vec<f64>,
    pub charge_kwh: Vec<f64>,
    /// Stored energy after each interval (kWh).
    pub soc_kwh: Vec<f64>,
    /// Import remaining after discharge.
    pub import_after_kwh: Vec<f64>,
    /// PV excess remaining after charge, available for export.
    pub pv_excess_after_kwh: Vec<f64>,
}

impl DispatchOutcome {
    /// No battery: buffers pass through, every trace is zero.
    pub fn idle(import_kwh: Vec<f64>, pv_excess_kwh: Vec<f64>) -> Self {
        let n = import_kwh.len();
        Self {
            discharge_kwh: vec![0.0; n],
            charge_kwh: vec![0.0; n],
            soc_kwh: vec![0.0; n],
            import_after_kwh: import_kwh,
            pv_excess_after_kwh: pv_excess_kwh,
        }
    }

    pub fn total_charge_kwh(&self) -> f64 {
        self.charge_kwh.iter().sum()
    }

    pub fn total_discharge_kwh(&self) -> f64 {
        self.discharge_kwh.iter().sum()
    }
}

/// Dispatches a battery over aligned import and PV-excess buffers.
///
/// The buffers are consumed and returned reduced in the outcome, so callers
/// keep their own copies untouched. A shorter `pv_excess_kwh` is treated as
/// zero-padded. A disabled battery returns the buffers unchanged with zero
/// charge, discharge and SOC traces.
///
/// # Arguments
///
/// * `config` - Battery parameters
/// * `import_kwh` - Import per interval after PV offset
/// * `pv_excess_kwh` - PV not used by the load, per interval
/// * `interval_hours` - Duration of one interval in hours
pub fn dispatch(
    config: &BatteryConfig,
    mut import_kwh: Vec<f64>,
    mut pv_excess_kwh: Vec<f64>,
    interval_hours: f64,
) -> DispatchOutcome {
    let n = import_kwh.len();
    pv_excess_kwh.resize(n, 0.0);

    if !config.is_enabled() {
        return DispatchOutcome::idle(import_kwh, pv_excess_kwh);
    }

    let mut battery = Battery::new(config, interval_hours);
    let mut discharge_kwh = Vec::with_capacity(n);
    let mut charge_kwh = Vec::with_capacity(n);
    let mut soc_kwh = Vec::with_capacity(n);

    for (import, excess) in import_kwh.iter_mut().zip(pv_excess_kwh.iter_mut()) {
        let step = battery.step(*import, *excess);
        *excess -= step.charge_kwh;
        *import -= step.discharge_kwh;
        charge_kwh.push(step.charge_kwh);
        discharge_kwh.push(step.discharge_kwh);
        soc_kwh.push(step.soc_kwh);
    }

    DispatchOutcome {
        discharge_kwh,
        charge_kwh,
        soc_kwh,
        import_after_kwh: import_kwh,
        pv_excess_after_kwh: pv_excess_kwh,
    }
}
