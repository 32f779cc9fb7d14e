//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::devices::{BaseLoad, BatteryConfig, EvConfig, PvConfig};
use crate::sim::clock::TimeOfDay;
use crate::sim::engine::Scenario;
use crate::summary::SummaryOptions;
use crate::tariff::{BillingOptions, TariffPlan, TouBand};

/// Top-level scenario configuration parsed from TOML.
///
/// Every section is optional. `[baseline]` describes the synthetic household
/// used when no meter data is supplied; `[ev]`, `[pv]`, `[battery]` and
/// `[tariff]` switch components on by being present. `[billing]` adds
/// explicit billing cycles priced with the tariff. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or pick a built-in preset with
/// [`ScenarioConfig::from_preset`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Label used in reports.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub baseline: BaseLoad,
    #[serde(default)]
    pub ev: Option<EvConfig>,
    #[serde(default)]
    pub pv: Option<PvConfig>,
    #[serde(default)]
    pub battery: Option<BatteryConfig>,
    #[serde(default)]
    pub tariff: Option<TariffPlan>,
    #[serde(default)]
    pub billing: Option<BillingOptions>,
    #[serde(default)]
    pub summary: SummaryOptions,
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"battery.soc_min"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Time-of-use plan used by the presets: all-day off-peak with a weekday
/// evening peak overlaid.
pub fn residential_tou_plan() -> TariffPlan {
    TariffPlan {
        usage_bands: vec![
            TouBand {
                name: "offpeak".to_string(),
                start: TimeOfDay::MIDNIGHT,
                end: TimeOfDay::END_OF_DAY,
                rate_c_per_kwh: 22.0,
            },
            TouBand {
                name: "peak".to_string(),
                start: TimeOfDay::from_minutes(16 * 60),
                end: TimeOfDay::from_minutes(21 * 60),
                rate_c_per_kwh: 38.0,
            },
        ],
        fixed_c_per_day: 110.0,
        feed_in_c_per_kwh: 5.0,
        demand: None,
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: synthetic household, no components.
    pub fn baseline() -> Self {
        Self {
            name: Some("baseline".to_string()),
            tariff: Some(residential_tou_plan()),
            ..Self::default()
        }
    }

    /// Returns the EV preset: default overnight charger on the baseline.
    pub fn ev() -> Self {
        Self {
            name: Some("ev".to_string()),
            ev: Some(EvConfig::default()),
            ..Self::baseline()
        }
    }

    /// Returns the solar preset: 6.6 kWp array on a 5 kW inverter.
    pub fn solar() -> Self {
        Self {
            name: Some("solar".to_string()),
            pv: Some(PvConfig::new(6.6, 5.0)),
            ..Self::baseline()
        }
    }

    /// Returns the solar + battery preset: the solar array plus a 13.5 kWh battery.
    pub fn solar_battery() -> Self {
        Self {
            name: Some("solar_battery".to_string()),
            battery: Some(BatteryConfig::new(13.5, 5.0)),
            ..Self::solar()
        }
    }

    /// Returns the full preset: EV, solar and battery together.
    pub fn full() -> Self {
        Self {
            name: Some("full".to_string()),
            ev: Some(EvConfig::default()),
            ..Self::solar_battery()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "ev", "solar", "solar_battery", "full"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "ev" => Ok(Self::ev()),
            "solar" => Ok(Self::solar()),
            "solar_battery" => Ok(Self::solar_battery()),
            "full" => Ok(Self::full()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// The scenario components, detached from the synthetic baseline.
    pub fn scenario(&self) -> Scenario {
        Scenario {
            name: self.name.clone(),
            ev: self.ev.clone(),
            pv: self.pv.clone(),
            battery: self.battery.clone(),
            tariff: self.tariff.clone(),
            billing: self.billing.clone(),
            summary: self.summary.clone(),
        }
    }

    /// Validates all sections and returns every violation found.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = self.baseline.validate("baseline");
        errors.extend(self.scenario().validate());
        errors
    }
}
