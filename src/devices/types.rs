//! Common types and traits for per-interval energy models.

use chrono::DateTime;
use chrono_tz::Tz;
use rand::{Rng, rngs::StdRng};

use crate::error::Result;

/// A model that turns a local-time index into per-interval energy.
///
/// Implementations are pure over their configuration: the same index and
/// interval length always give the same output, one value per timestamp.
pub trait IntervalProfile {
    /// Returns kWh per interval, same length as `index`.
    ///
    /// # Arguments
    ///
    /// * `index` - Interval start times in local wall-clock time
    /// * `interval_hours` - Duration of one interval in hours
    fn energy_kwh(&self, index: &[DateTime<Tz>], interval_hours: f64) -> Result<Vec<f64>>;

    /// Returns a human-readable type name for the model.
    fn device_type(&self) -> &'static str;
}

/// Utility function to generate Gaussian noise using Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and specified standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}
