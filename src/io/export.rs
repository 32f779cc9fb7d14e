//! CSV export for canonical series and scenario traces.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::canon::CanonicalSeries;
use crate::sim::types::IntervalTrace;

/// Column header for canonical series export; matches the import layout.
const SERIES_HEADER: &str = "timestamp,meter_id,channel,flow,energy_kwh,interval_minutes";

/// Column header for per-interval trace export.
const TRACE_HEADER: &str = "timestamp,baseline_import_kwh,baseline_export_kwh,ev_kwh,pv_kwh,\
                            pv_used_kwh,import_after_kwh,export_after_kwh,\
                            battery_charge_kwh,battery_discharge_kwh,battery_soc_kwh";

/// Exports a canonical series to a CSV file at the given path.
///
/// Timestamps are RFC 3339 with their UTC offset, so the file reads back
/// without naming a zone.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_series_csv(series: &CanonicalSeries, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_series_csv(series, buf)
}

/// Writes a canonical series as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_series_csv(series: &CanonicalSeries, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(SERIES_HEADER.split(','))?;
    for r in series.records() {
        wtr.write_record(&[
            r.timestamp.to_rfc3339(),
            r.meter_id.clone(),
            r.channel.clone(),
            r.flow.to_string(),
            format!("{:.6}", r.energy_kwh),
            r.interval_minutes.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports a scenario trace to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_trace_csv(trace: &[IntervalTrace], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_trace_csv(trace, buf)
}

/// Writes a scenario trace as CSV to any writer, one row per interval.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_trace_csv(trace: &[IntervalTrace], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(TRACE_HEADER.split(',').map(str::trim))?;
    for t in trace {
        wtr.write_record(&[
            t.timestamp.to_rfc3339(),
            format!("{:.6}", t.baseline_import_kwh),
            format!("{:.6}", t.baseline_export_kwh),
            format!("{:.6}", t.ev_kwh),
            format!("{:.6}", t.pv_kwh),
            format!("{:.6}", t.pv_used_kwh),
            format!("{:.6}", t.import_after_kwh),
            format!("{:.6}", t.export_after_kwh),
            format!("{:.6}", t.battery_charge_kwh),
            format!("{:.6}", t.battery_discharge_kwh),
            format!("{:.6}", t.battery_soc_kwh),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
