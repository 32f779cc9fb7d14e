pub mod export;
pub mod import;

pub use export::{export_series_csv, export_trace_csv};
pub use import::{read_canonical_csv, read_canonical_csv_path};
