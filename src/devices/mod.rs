//! Per-interval energy models for the household: baseline load, EV charging,
//! rooftop PV, and battery storage.

/// Synthetic household baseline generator.
pub mod baseload;
/// Self-consumption battery dispatcher.
pub mod battery;
/// EV charge allocator.
pub mod ev_charger;
/// Solar PV shape and generation model.
pub mod solar;
pub mod types;

// Re-export the main types for convenience
pub use baseload::BaseLoad;
pub use battery::{Battery, BatteryConfig, DispatchOutcome, dispatch};
pub use ev_charger::{EvConfig, EvStrategy};
pub use solar::{PvConfig, normalized_pv_shape};
pub use types::IntervalProfile;
