//! meter-scenario entry point: CLI wiring, baseline loading and report output.

use std::fs;
use std::path::Path;
use std::process;

use chrono_tz::Tz;
use tracing::{Level, info};

use meter_scenario::canon::CanonicalSeries;
use meter_scenario::config::ScenarioConfig;
use meter_scenario::io::{export_series_csv, export_trace_csv, read_canonical_csv_path};
use meter_scenario::sim::kpi::ScenarioReport;
use meter_scenario::sim::types::ScenarioResult;

/// Parsed CLI arguments.
struct CliArgs {
    input: Option<String>,
    tz: Option<Tz>,
    meter: Option<String>,
    scenario_path: Option<String>,
    preset: Option<String>,
    after_out: Option<String>,
    trace_out: Option<String>,
    json_out: Option<String>,
    verbose: bool,
}

fn print_help() {
    eprintln!("meter-scenario: what-if EV / PV / battery simulation on meter data");
    eprintln!();
    eprintln!("Usage: meter-scenario [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --input <path>       Canonical meter CSV (default: synthetic baseline)");
    eprintln!("  --tz <zone>          IANA zone for naive CSV timestamps");
    eprintln!("  --meter <id>         Keep only this meter from the input");
    eprintln!("  --scenario <path>    Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>      Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --after-out <path>   Write the reconstructed series to CSV");
    eprintln!("  --trace-out <path>   Write the per-interval trace to CSV");
    eprintln!("  --json-out <path>    Write the full result as JSON");
    eprintln!("  --verbose            Debug-level logging on stderr");
    eprintln!("  --help               Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
}

/// Returns the value following a flag, or exits with an error.
fn flag_value(args: &[String], i: usize, flag: &str, what: &str) -> String {
    match args.get(i) {
        Some(v) => v.clone(),
        None => {
            eprintln!("error: {flag} requires {what}");
            process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        input: None,
        tz: None,
        meter: None,
        scenario_path: None,
        preset: None,
        after_out: None,
        trace_out: None,
        json_out: None,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--input" => {
                i += 1;
                cli.input = Some(flag_value(&args, i, "--input", "a path argument"));
            }
            "--tz" => {
                i += 1;
                let name = flag_value(&args, i, "--tz", "a timezone name");
                if let Ok(tz) = name.parse::<Tz>() {
                    cli.tz = Some(tz);
                } else {
                    eprintln!("error: --tz value \"{name}\" is not a known IANA timezone");
                    process::exit(1);
                }
            }
            "--meter" => {
                i += 1;
                cli.meter = Some(flag_value(&args, i, "--meter", "a meter id"));
            }
            "--scenario" => {
                i += 1;
                cli.scenario_path = Some(flag_value(&args, i, "--scenario", "a path argument"));
            }
            "--preset" => {
                i += 1;
                cli.preset = Some(flag_value(&args, i, "--preset", "a name argument"));
            }
            "--after-out" => {
                i += 1;
                cli.after_out = Some(flag_value(&args, i, "--after-out", "a path argument"));
            }
            "--trace-out" => {
                i += 1;
                cli.trace_out = Some(flag_value(&args, i, "--trace-out", "a path argument"));
            }
            "--json-out" => {
                i += 1;
                cli.json_out = Some(flag_value(&args, i, "--json-out", "a path argument"));
            }
            "--verbose" | "-v" => {
                cli.verbose = true;
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    if cli.scenario_path.is_some() && cli.preset.is_some() {
        eprintln!("error: --scenario and --preset are mutually exclusive");
        process::exit(1);
    }

    cli
}

/// Loads the meter CSV when given, otherwise synthesizes the configured baseline.
fn load_baseline(cli: &CliArgs, cfg: &ScenarioConfig) -> meter_scenario::Result<CanonicalSeries> {
    let series = match &cli.input {
        Some(path) => read_canonical_csv_path(Path::new(path), cli.tz)?,
        None => cfg.baseline.to_series()?,
    };
    Ok(match &cli.meter {
        Some(id) => series.for_meter(id),
        None => series,
    })
}

fn write_outputs(cli: &CliArgs, result: &ScenarioResult) -> meter_scenario::Result<()> {
    if let Some(ref path) = cli.after_out {
        export_series_csv(&result.after, Path::new(path))?;
        eprintln!("After-series written to {path}");
    }
    if let Some(ref path) = cli.trace_out {
        export_trace_csv(&result.trace, Path::new(path))?;
        eprintln!("Trace written to {path}");
    }
    if let Some(ref path) = cli.json_out {
        let json = serde_json::to_string_pretty(result)?;
        fs::write(path, json)?;
        eprintln!("Result written to {path}");
    }
    Ok(())
}

fn main() {
    let cli = parse_args();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .without_time()
        .compact()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    // Load config: --scenario takes priority, then --preset, then baseline default
    let config = if let Some(ref path) = cli.scenario_path {
        ScenarioConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name)
    } else {
        Ok(ScenarioConfig::baseline())
    };
    let config = config.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let baseline = load_baseline(&cli, &config).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });
    info!(
        records = baseline.len(),
        source = cli.input.as_deref().unwrap_or("synthetic"),
        "baseline ready"
    );

    let result = config.scenario().run(&baseline).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });

    let report = ScenarioReport {
        name: result.name.as_deref().unwrap_or("custom"),
        import_before_kwh: result.before.import_kwh(),
        export_before_kwh: result.before.export_kwh(),
        delta: &result.delta,
        explain: &result.explain,
    };
    println!("{report}");

    if let (Some(before), Some(after)) = (&result.cost_before, &result.cost_after) {
        println!("\n--- Cost before ---\n{before}");
        println!("\n--- Cost after ---\n{after}");
    }
    if let (Some(before), Some(after)) = (&result.cycle_cost_before, &result.cycle_cost_after) {
        println!("\n--- Billing cycles before ---\n{before}");
        println!("\n--- Billing cycles after ---\n{after}");
    }

    if let Err(e) = write_outputs(&cli, &result) {
        eprintln!("error: failed to write output: {e}");
        process::exit(1);
    }
}
