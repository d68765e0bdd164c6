// End-to-end tests for the dcfgrid binary: exit codes, written files and
// the --json stdout contract.
//
// Run with: cargo test -p dcfgrid-cli --test cli_tests -- --nocapture

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::tempdir;

fn dcfgrid() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_dcfgrid"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    cmd.env_remove("DCFGRID_SCENARIO");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn dataset() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data/alphabet_fy2025.toml")
}

/// Copy of the reference dataset with one textual edit applied.
fn edited_dataset(dir: &Path, from: &str, to: &str) -> PathBuf {
    let text = std::fs::read_to_string(dataset()).unwrap();
    assert!(text.contains(from), "fixture text not found: {from}");
    let path = dir.join("edited.toml");
    std::fs::write(&path, text.replacen(from, to, 1)).unwrap();
    path
}

fn run(args: &[&str]) -> Output {
    dcfgrid().args(args).output().expect("run dcfgrid")
}

/// Assert stdout is a single, parseable JSON value with no extra lines.
fn assert_single_json(stdout: &str) -> serde_json::Value {
    let trimmed = stdout.trim();
    assert!(!trimmed.is_empty(), "stdout should not be empty");
    serde_json::from_str(trimmed)
        .unwrap_or_else(|e| panic!("stdout must be valid JSON.\nParse error: {}\nstdout:\n{}", e, trimmed))
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ===========================================================================
// dcfgrid build
// ===========================================================================

#[test]
fn build_writes_workbook_and_json() {
    let dir = tempdir().unwrap();
    let xlsx = dir.path().join("goog.xlsx");
    let json = dir.path().join("goog.json");
    let ds = dataset();

    let output = run(&[
        "build",
        ds.to_str().unwrap(),
        "--scenario",
        "bull",
        "-o",
        xlsx.to_str().unwrap(),
        "--json",
        json.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(xlsx.metadata().unwrap().len() > 0);

    let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(value["scenario"], "bull");
    assert_eq!(value["company"], "Alphabet Inc.");

    let err = stderr(&output);
    assert!(err.contains("Bull Case"), "{err}");
    assert!(err.contains("fingerprint          blake3:"), "{err}");
    assert!(output.stdout.is_empty(), "build prints nothing on stdout");
}

#[test]
fn build_quiet_is_silent() {
    let dir = tempdir().unwrap();
    let xlsx = dir.path().join("out.xlsx");
    let ds = dataset();
    let output = run(&["build", ds.to_str().unwrap(), "-o", xlsx.to_str().unwrap(), "--quiet"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(output.stderr.is_empty(), "stderr: {}", stderr(&output));
    assert!(xlsx.exists());
}

#[test]
fn failed_json_write_leaves_no_workbook() {
    let dir = tempdir().unwrap();
    let xlsx = dir.path().join("m.xlsx");
    let json = dir.path().join("nodir").join("m.json");
    let ds = dataset();
    let output = run(&["build", ds.to_str().unwrap(), "-o", xlsx.to_str().unwrap(), "--json", json.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(3));
    assert!(!xlsx.exists(), "workbook must not outlive a failed build");
    assert!(!json.exists());
    let err = stderr(&output);
    assert!(err.contains("m.json"), "{err}");
}

#[test]
fn build_rejects_non_xlsx_output() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.csv");
    let ds = dataset();
    let output = run(&["build", ds.to_str().unwrap(), "-o", out.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!out.exists());
}

#[test]
fn unknown_scenario_is_usage_error() {
    let ds = dataset();
    let output = run(&["build", ds.to_str().unwrap(), "--scenario", "sideways"]);
    assert_eq!(output.status.code(), Some(2));
}

// ===========================================================================
// Exit codes
// ===========================================================================

#[test]
fn missing_dataset_exits_io() {
    let output = run(&["check", "no/such/dataset.toml"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).starts_with("error: "), "{}", stderr(&output));
}

#[test]
fn malformed_dataset_exits_dataset() {
    let dir = tempdir().unwrap();
    let path = edited_dataset(dir.path(), "[company]", "[company");
    let output = run(&["check", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn short_bull_track_exits_missing_assumption() {
    let dir = tempdir().unwrap();
    let path = edited_dataset(dir.path(), "bull = [0.38, 0.30, 0.25, 0.20, 0.17]", "bull = [0.38]");

    // Base still builds; only the bull case is short.
    let base = run(&["check", path.to_str().unwrap()]);
    assert!(base.status.success(), "stderr: {}", stderr(&base));

    let output = run(&["check", path.to_str().unwrap(), "--scenario", "bull"]);
    assert_eq!(output.status.code(), Some(10));
    let err = stderr(&output);
    assert!(err.contains("growth.cloud"), "{err}");
    assert!(err.contains("hint:  give [drivers.\"growth.cloud\"] a bull value"), "{err}");
}

#[test]
fn terminal_growth_above_wacc_exits_invalid_terminal() {
    let dir = tempdir().unwrap();
    let path = edited_dataset(dir.path(), "base = 0.030\nbull = 0.033", "base = 0.20\nbull = 0.033");
    let output = run(&["check", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(11));
}

// ===========================================================================
// dcfgrid check --json
// ===========================================================================

#[test]
fn check_all_scenarios_json() {
    let ds = dataset();
    let output = run(&["check", ds.to_str().unwrap(), "--all-scenarios", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    let reports = val.as_array().expect("array of reports");
    assert_eq!(reports.len(), 3);
    let names: Vec<&str> = reports.iter().map(|r| r["scenario"].as_str().unwrap()).collect();
    assert_eq!(names, ["base", "bull", "bear"]);

    for report in reports {
        assert_eq!(report["ok"], true);
        assert!(report["fingerprint"].as_str().unwrap().starts_with("blake3:"));
        assert!(report["price"].as_f64().unwrap() > 0.0);
        let results = report["checks"]["results"].as_array().unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r["status"] != "forecast_drift" || r["forecast"] == true));
    }
}

#[test]
fn check_json_reports_failure_on_stdout() {
    let dir = tempdir().unwrap();
    let path = edited_dataset(dir.path(), "bull = [0.38, 0.30, 0.25, 0.20, 0.17]", "bull = [0.38]");
    let output = run(&["check", path.to_str().unwrap(), "--scenario", "bull", "--json"]);
    assert_eq!(output.status.code(), Some(10));

    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(val["ok"], false);
    assert_eq!(val["error"]["kind"], "missing_assumption");
    assert_eq!(val["error"]["exit_code"], 10);
    assert!(val.get("checks").is_none());
}

#[test]
fn scenario_flag_conflicts_with_all_scenarios() {
    let ds = dataset();
    let output = run(&["check", ds.to_str().unwrap(), "--scenario", "bull", "--all-scenarios"]);
    assert_eq!(output.status.code(), Some(2));
}

// ===========================================================================
// dcfgrid drivers
// ===========================================================================

#[test]
fn drivers_lists_coverage() {
    let ds = dataset();
    let output = run(&["drivers", ds.to_str().unwrap(), "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let val = assert_single_json(&String::from_utf8_lossy(&output.stdout));
    let rows = val.as_array().unwrap();
    let cloud = rows.iter().find(|r| r["key"] == "growth.cloud").expect("growth.cloud listed");
    assert_eq!(cloud["base"], "5/5");
    assert_eq!(cloud["bear"], "5/5");

    let terminal = rows.iter().find(|r| r["key"] == "terminal_growth").unwrap();
    assert_eq!(terminal["bull"], "flat");
}

#[test]
fn drivers_table_has_header() {
    let ds = dataset();
    let output = run(&["drivers", ds.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().next().unwrap().starts_with("DRIVER"));
    assert!(stdout.contains("growth.cloud"));
}
