// dcfgrid CLI - build, check and inspect DCF models from a TOML dataset

mod exit_codes;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use dcfgrid_engine::scenario::Track;
use dcfgrid_engine::{BuildError, CheckStatus, Dataset, Model, Scenario};
use serde::Serialize;

use exit_codes::{build_exit_code, EXIT_ERROR, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "dcfgrid")]
#[command(about = "Segment-driven DCF workbooks from filed financials and scenario drivers")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the model and write the workbook
    #[command(after_help = "\
Examples:
  dcfgrid build data/alphabet_fy2025.toml
  dcfgrid build data/alphabet_fy2025.toml --scenario bull -o goog_bull.xlsx
  dcfgrid build data/alphabet_fy2025.toml --json goog.json --quiet")]
    Build {
        /// Dataset TOML
        dataset: PathBuf,

        /// Active scenario (base, bull, bear)
        #[arg(long, short = 's', default_value = "base", env = "DCFGRID_SCENARIO")]
        scenario: Scenario,

        /// Output workbook (default: <dataset stem>_<scenario>.xlsx)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Also write the model as JSON
        #[arg(long, value_name = "PATH")]
        json: Option<PathBuf>,

        /// Suppress the summary on stderr
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// Build without writing and report every cross-check
    #[command(after_help = "\
Examples:
  dcfgrid check data/alphabet_fy2025.toml
  dcfgrid check data/alphabet_fy2025.toml --all-scenarios --json")]
    Check {
        /// Dataset TOML
        dataset: PathBuf,

        /// Scenario to build
        #[arg(long, short = 's', default_value = "base", conflicts_with = "all_scenarios")]
        scenario: Scenario,

        /// Build base, bull and bear
        #[arg(long)]
        all_scenarios: bool,

        /// Machine-readable report on stdout
        #[arg(long)]
        json: bool,
    },

    /// List drivers and which scenario values they carry
    Drivers {
        /// Dataset TOML
        dataset: PathBuf,

        /// Machine-readable listing on stdout
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("GIT_COMMIT_HASH"),
        ")",
        "\nengine:  dcfgrid-engine ",
        env!("CARGO_PKG_VERSION"),
        "\ntarget:  ",
        env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Build { dataset, scenario, output, json, quiet } => cmd_build(dataset, scenario, output, json, quiet),
        Commands::Check { dataset, scenario, all_scenarios, json } => cmd_check(dataset, scenario, all_scenarios, json),
        Commands::Drivers { dataset, json } => cmd_drivers(dataset, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    /// Exit code and hint follow the error kind.
    pub fn build(err: &BuildError) -> Self {
        let hint = match err {
            BuildError::MissingAssumption { driver, scenario, .. } => Some(format!(
                "give [drivers.\"{driver}\"] a {scenario} value for every forecast period"
            )),
            BuildError::InvalidTerminalAssumption { .. } => Some(
                "terminal growth must stay below WACC; check drivers.terminal_growth and [valuation.sensitivity]"
                    .to_string(),
            ),
            BuildError::BalanceIdentity { period, .. } | BuildError::CrossCheckMismatch { period, .. } => Some(format!(
                "check the filed figures for {period}, or mark the period estimated under [[provenance]]"
            )),
            BuildError::DuplicateKey { .. } | BuildError::UnresolvedReference { .. } | BuildError::FrozenSheet { .. } => {
                Some("this is a builder bug, not a data problem; please report it".to_string())
            }
            BuildError::Config(_) | BuildError::Io(_) => None,
        };
        Self { code: build_exit_code(err), message: err.to_string(), hint }
    }

    /// Already reported on stdout as JSON; exit quietly with the code.
    pub fn silent(code: u8) -> Self {
        Self { code, message: String::new(), hint: None }
    }
}

fn load(path: &Path) -> Result<Dataset, CliError> {
    Dataset::load(path).map_err(|e| CliError::build(&e))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError { code: EXIT_ERROR, message: e.to_string(), hint: None })?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", text).map_err(|e| CliError::io(e.to_string()))
}

// ============================================================================
// build
// ============================================================================

fn cmd_build(
    dataset_path: PathBuf,
    scenario: Scenario,
    output: Option<PathBuf>,
    json: Option<PathBuf>,
    quiet: bool,
) -> Result<(), CliError> {
    let dataset = load(&dataset_path)?;
    log::info!("loaded {} ({} drivers)", dataset_path.display(), dataset.drivers.len());
    let model = Model::build(&dataset, scenario).map_err(|e| CliError::build(&e))?;

    let output = output.unwrap_or_else(|| default_output(&dataset_path, scenario));
    if output.extension().and_then(|e| e.to_str()) != Some("xlsx") {
        return Err(CliError::usage(format!("output must be an .xlsx file: {}", output.display())));
    }
    // Render everything before writing anything; both files land or neither.
    let (workbook, result) = dcfgrid_io::xlsx::render(&model).map_err(CliError::io)?;
    let json_bytes = match &json {
        Some(_) => Some(dcfgrid_io::json::render(&model).map_err(CliError::io)?),
        None => None,
    };
    let mut outputs: Vec<(&Path, &[u8])> = vec![(output.as_path(), workbook.as_slice())];
    if let (Some(path), Some(bytes)) = (&json, &json_bytes) {
        outputs.push((path.as_path(), bytes.as_slice()));
    }
    dcfgrid_io::write_all(&outputs).map_err(CliError::io)?;
    log::info!("wrote {} ({})", output.display(), result.summary());

    if !quiet {
        eprintln!("{} ({})", model.company, scenario.title());
        if let Some(price) = model.value("dcf.price", 0) {
            eprintln!("  implied share price  {:.2}", price);
        }
        eprintln!("  checks               {}", check_line(&model));
        eprintln!("  fingerprint          {}", model.fingerprint());
        eprintln!("wrote {} ({})", output.display(), result.summary());
        if let Some(path) = &json {
            eprintln!("wrote {}", path.display());
        }
    }
    Ok(())
}

fn default_output(dataset: &Path, scenario: Scenario) -> PathBuf {
    let stem = dataset.file_stem().and_then(|s| s.to_str()).unwrap_or("model");
    PathBuf::from(format!("{}_{}.xlsx", stem, scenario))
}

fn check_line(model: &Model) -> String {
    let checks = &model.checks;
    format!(
        "{} results: {} pass, {} estimated, {} forecast drift",
        checks.results.len(),
        checks.count(CheckStatus::Pass),
        checks.count(CheckStatus::Estimated),
        checks.count(CheckStatus::ForecastDrift)
    )
}

// ============================================================================
// check
// ============================================================================

#[derive(Serialize)]
struct CheckOutput<'a> {
    scenario: Scenario,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checks: Option<&'a dcfgrid_engine::CheckReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorOutput>,
}

#[derive(Serialize)]
struct ErrorOutput {
    kind: &'static str,
    message: String,
    exit_code: u8,
}

fn cmd_check(dataset_path: PathBuf, scenario: Scenario, all_scenarios: bool, json: bool) -> Result<(), CliError> {
    let dataset = load(&dataset_path)?;
    let scenarios: Vec<Scenario> = if all_scenarios { Scenario::ALL.to_vec() } else { vec![scenario] };
    let builds: Vec<(Scenario, Result<Model, BuildError>)> =
        scenarios.iter().map(|&s| (s, Model::build(&dataset, s))).collect();
    let first_error = builds.iter().find_map(|(_, r)| r.as_ref().err());
    if let Some(err) = first_error {
        log::debug!("check failed: {}", err.kind());
    }

    if json {
        let outputs: Vec<CheckOutput> = builds.iter().map(|(s, r)| check_output(*s, r)).collect();
        if all_scenarios {
            print_json(&outputs)?;
        } else {
            print_json(&outputs[0])?;
        }
        return match first_error {
            Some(err) => Err(CliError::silent(build_exit_code(err))),
            None => Ok(()),
        };
    }

    for (s, result) in &builds {
        match result {
            Ok(model) => print_report(*s, model),
            Err(err) => eprintln!("{}: FAILED ({})", s, err.kind()),
        }
    }
    match first_error {
        Some(err) => Err(CliError::build(err)),
        None => Ok(()),
    }
}

fn check_output(scenario: Scenario, result: &Result<Model, BuildError>) -> CheckOutput<'_> {
    match result {
        Ok(model) => CheckOutput {
            scenario,
            ok: true,
            fingerprint: Some(model.fingerprint()),
            price: model.value("dcf.price", 0),
            checks: Some(&model.checks),
            error: None,
        },
        Err(err) => CheckOutput {
            scenario,
            ok: false,
            fingerprint: None,
            price: None,
            checks: None,
            error: Some(ErrorOutput { kind: err.kind(), message: err.to_string(), exit_code: build_exit_code(err) }),
        },
    }
}

fn print_report(scenario: Scenario, model: &Model) {
    eprintln!("{}: {}", scenario, check_line(model));
    for r in model.checks.results.iter().filter(|r| r.status != CheckStatus::Pass) {
        eprintln!(
            "  {:<16} {:<6} {:<40} {:>14.3}",
            r.status.to_string(),
            r.period,
            r.check,
            r.difference
        );
    }
    if let Some(price) = model.value("dcf.price", 0) {
        eprintln!("  implied share price {:.2}", price);
    }
}

// ============================================================================
// drivers
// ============================================================================

#[derive(Serialize)]
struct DriverRow {
    key: String,
    label: String,
    historical: usize,
    base: String,
    bull: String,
    bear: String,
}

fn cmd_drivers(dataset_path: PathBuf, json: bool) -> Result<(), CliError> {
    let dataset = load(&dataset_path)?;
    let horizon = dataset.periods.forecast.len();

    let rows: Vec<DriverRow> = dataset
        .drivers
        .iter()
        .map(|(key, driver)| {
            let coverage = |s: Scenario| match driver.track(s) {
                None => "missing".to_string(),
                Some(Track::Flat(_)) => "flat".to_string(),
                Some(Track::PerPeriod(values)) => format!("{}/{}", values.len(), horizon),
            };
            DriverRow {
                key: key.to_string(),
                label: driver.label.clone(),
                historical: driver.historical.len(),
                base: coverage(Scenario::Base),
                bull: coverage(Scenario::Bull),
                bear: coverage(Scenario::Bear),
            }
        })
        .collect();

    if json {
        return print_json(&rows);
    }

    let mut out = format!("{:<32} {:>4} {:>8} {:>8} {:>8}  {}\n", "DRIVER", "HIST", "BASE", "BULL", "BEAR", "LABEL");
    for row in &rows {
        out.push_str(&format!(
            "{:<32} {:>4} {:>8} {:>8} {:>8}  {}\n",
            row.key, row.historical, row.base, row.bull, row.bear, row.label
        ));
    }
    io::stdout().lock().write_all(out.as_bytes()).map_err(|e| CliError::io(e.to_string()))?;
    Ok(())
}
