//! What-if simulation for household electricity meter data.
//!
//! A baseline interval series (canonical import/export records for one
//! meter) is run through optional EV charging, rooftop PV and a battery to
//! produce a reconstructed "after" series with summaries, costs and a
//! before/after comparison.

pub mod canon;
pub mod config;
pub mod devices;
pub mod error;
/// Canonical CSV import and CSV export of series and traces.
pub mod io;
pub mod sim;
pub mod summary;
pub mod tariff;

pub use error::{Error, Result};
