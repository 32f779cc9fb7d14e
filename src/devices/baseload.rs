use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike};
use chrono_tz::Tz;
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::canon::{CanonicalSeries, DEFAULT_CADENCE_MIN, DEFAULT_TZ, Flow};
use crate::config::ConfigError;
use crate::devices::types::{IntervalProfile, gaussian_noise};
use crate::error::{Error, Result};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// A synthetic household baseline used when no meter data is supplied.
///
/// Demand is a daily sinusoid on local wall-clock time plus seeded Gaussian
/// noise, floored at zero:
///
/// `kw = max(base_kw + amp_kw · sin(2π · day_fraction + phase_rad) + noise, 0)`
///
/// # Examples
///
/// ```
/// use meter_scenario::devices::baseload::BaseLoad;
///
/// let load = BaseLoad {
///     days: 2,
///     noise_std: 0.0,
///     ..BaseLoad::default()
/// };
/// let series = load.to_series().unwrap();
/// assert_eq!(series.len(), 96);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaseLoad {
    /// First local calendar day of the series.
    pub start_date: NaiveDate,
    /// Number of local calendar days.
    pub days: u32,
    pub interval_minutes: u32,
    pub timezone: Tz,
    pub meter_id: String,
    /// Average demand (kW).
    pub base_kw: f64,
    /// Amplitude of the daily swing (kW).
    pub amp_kw: f64,
    /// Phase offset in radians; 0 puts the mean crossing at midnight.
    pub phase_rad: f64,
    /// Standard deviation of per-interval noise (kW).
    pub noise_std: f64,
    pub seed: u64,
}

impl Default for BaseLoad {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap_or_default(),
            days: 7,
            interval_minutes: DEFAULT_CADENCE_MIN,
            timezone: DEFAULT_TZ,
            meter_id: "SYNTH-0001".to_string(),
            base_kw: 0.8,
            amp_kw: 0.4,
            phase_rad: -std::f64::consts::FRAC_PI_2,
            noise_std: 0.05,
            seed: 42,
        }
    }
}

impl BaseLoad {
    pub fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.days == 0 {
            errors.push(ConfigError::new(format!("{prefix}.days"), "must be > 0"));
        }
        if self.interval_minutes == 0 || 1440 % self.interval_minutes != 0 {
            errors.push(ConfigError::new(
                format!("{prefix}.interval_minutes"),
                "must be > 0 and divide 1440",
            ));
        }
        if self.meter_id.trim().is_empty() {
            errors.push(ConfigError::new(format!("{prefix}.meter_id"), "must not be empty"));
        }
        for (name, value) in [
            ("base_kw", self.base_kw),
            ("amp_kw", self.amp_kw),
            ("phase_rad", self.phase_rad),
        ] {
            if !value.is_finite() {
                errors.push(ConfigError::new(format!("{prefix}.{name}"), "must be finite"));
            }
        }
        if !self.noise_std.is_finite() || self.noise_std < 0.0 {
            errors.push(ConfigError::new(
                format!("{prefix}.noise_std"),
                "must be finite and >= 0",
            ));
        }
        errors
    }

    /// Interval starts from local midnight of `start_date` up to local
    /// midnight `days` later, stepping in absolute time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NonexistentLocalTime`] if either midnight falls in a
    /// DST gap.
    pub fn index(&self) -> Result<Vec<DateTime<Tz>>> {
        let start = local_midnight(self.timezone, self.start_date)?;
        let end_date = self.start_date + Duration::days(i64::from(self.days));
        let end = local_midnight(self.timezone, end_date)?;
        let step = Duration::minutes(i64::from(self.interval_minutes.max(1)));

        let mut index = Vec::new();
        let mut ts = start;
        while ts < end {
            index.push(ts);
            ts += step;
        }
        Ok(index)
    }

    /// Demand (kW) at a local instant before noise.
    pub fn mean_kw(&self, ts: &DateTime<Tz>) -> f64 {
        let day_fraction = f64::from(ts.num_seconds_from_midnight()) / SECONDS_PER_DAY;
        let angle = 2.0 * std::f64::consts::PI * day_fraction + self.phase_rad;
        self.base_kw + self.amp_kw * angle.sin()
    }

    /// Builds a canonical grid-import series on channel `E1`.
    ///
    /// # Errors
    ///
    /// Propagates index construction and canonical validation errors.
    pub fn to_series(&self) -> Result<CanonicalSeries> {
        let index = self.index()?;
        let hours = f64::from(self.interval_minutes) / 60.0;
        let kwh = self.energy_kwh(&index, hours)?;
        let series = CanonicalSeries::from_dense(
            self.timezone,
            &index,
            &kwh,
            &self.meter_id,
            Flow::GridImport.canonical_channel(),
            Flow::GridImport,
            self.interval_minutes,
        );
        crate::canon::validate::validate(&series)?;
        Ok(series)
    }
}

fn local_midnight(tz: Tz, date: NaiveDate) -> Result<DateTime<Tz>> {
    let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| Error::NonexistentLocalTime(naive.to_string(), tz.name().to_string()))
}

impl IntervalProfile for BaseLoad {
    /// Seeded and repeatable: the same index always yields the same demand.
    fn energy_kwh(&self, index: &[DateTime<Tz>], interval_hours: f64) -> Result<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok(index
            .iter()
            .map(|ts| {
                let kw = self.mean_kw(ts) + gaussian_noise(&mut rng, self.noise_std);
                kw.max(0.0) * interval_hours
            })
            .collect())
    }

    fn device_type(&self) -> &'static str {
        "BaseLoad"
    }
}
