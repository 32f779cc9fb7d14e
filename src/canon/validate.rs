//! Canonical invariant checks.

use std::collections::HashMap;

use chrono::DateTime;
use chrono_tz::Tz;
use thiserror::Error;

use super::CanonicalSeries;

/// A violated canonical invariant, naming the offending record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CanonError {
    #[error("record {index}: timezone {found} does not match series timezone {expected}")]
    TimezoneMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("record {index}: timestamp {timestamp} precedes the previous record")]
    NotSorted { index: usize, timestamp: String },

    #[error("record {index}: duplicate timestamp {timestamp} for meter {meter_id} channel {channel}")]
    DuplicateTimestamp {
        index: usize,
        timestamp: String,
        meter_id: String,
        channel: String,
    },

    #[error("record {index}: negative energy {value} kWh")]
    NegativeEnergy { index: usize, value: f64 },

    #[error("record {index}: energy is not a finite number")]
    NonFiniteEnergy { index: usize },

    #[error("record {index}: empty meter identifier")]
    EmptyMeterId { index: usize },

    #[error("record {index}: empty channel label")]
    EmptyChannel { index: usize },

    #[error("record {index}: interval_minutes must be > 0")]
    ZeroCadence { index: usize },

    #[error("meter {meter_id} channel {channel}: mixed cadences {first} and {second} minutes")]
    MixedCadence {
        meter_id: String,
        channel: String,
        first: u32,
        second: u32,
    },
}

/// Checks every canonical invariant; the empty series is valid.
///
/// - every timestamp is in the series timezone
/// - timestamps are non-decreasing overall and strictly increasing per
///   (meter, channel) group
/// - one positive cadence per group
/// - energy is finite and non-negative
/// - meter id and channel are non-empty
///
/// # Errors
///
/// Returns the first violation found, scanning in record order.
pub fn validate(series: &CanonicalSeries) -> Result<(), CanonError> {
    let tz = series.tz();
    let mut previous: Option<DateTime<Tz>> = None;
    let mut groups: HashMap<(&str, &str), (DateTime<Tz>, u32)> = HashMap::new();

    for (index, r) in series.records().iter().enumerate() {
        if r.timestamp.timezone() != tz {
            return Err(CanonError::TimezoneMismatch {
                index,
                expected: tz.name().to_string(),
                found: r.timestamp.timezone().name().to_string(),
            });
        }
        if previous.is_some_and(|p| r.timestamp < p) {
            return Err(CanonError::NotSorted {
                index,
                timestamp: r.timestamp.to_rfc3339(),
            });
        }
        previous = Some(r.timestamp);

        if !r.energy_kwh.is_finite() {
            return Err(CanonError::NonFiniteEnergy { index });
        }
        if r.energy_kwh < 0.0 {
            return Err(CanonError::NegativeEnergy {
                index,
                value: r.energy_kwh,
            });
        }
        if r.meter_id.trim().is_empty() {
            return Err(CanonError::EmptyMeterId { index });
        }
        if r.channel.trim().is_empty() {
            return Err(CanonError::EmptyChannel { index });
        }
        if r.interval_minutes == 0 {
            return Err(CanonError::ZeroCadence { index });
        }

        let key = (r.meter_id.as_str(), r.channel.as_str());
        if let Some(&(last_ts, cadence)) = groups.get(&key) {
            if r.timestamp <= last_ts {
                return Err(CanonError::DuplicateTimestamp {
                    index,
                    timestamp: r.timestamp.to_rfc3339(),
                    meter_id: r.meter_id.clone(),
                    channel: r.channel.clone(),
                });
            }
            if cadence != r.interval_minutes {
                return Err(CanonError::MixedCadence {
                    meter_id: r.meter_id.clone(),
                    channel: r.channel.clone(),
                    first: cadence,
                    second: r.interval_minutes,
                });
            }
        }
        groups.insert(key, (r.timestamp, r.interval_minutes));
    }

    Ok(())
}
