use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[sampling]
idle_period_ms = 100
fast_period_ms = 12

[stability]
window_samples = 10
stddev_mg = 30
p2p_mg = 100
dwell_ms = 300

[control]
hysteresis_mg = 100
measure_timeout_ms = 30000

[calibration]
span_mass_mg = 22000
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn cmd_in(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gravidose").unwrap();
    cmd.arg("--config").arg(write_valid_config(dir));
    cmd.arg("--state").arg(dir.path().join("state.json"));
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "OK", "stdout")]
#[case(&["dose", "--grams", "15"], 0, "Dispensed", "stdout")]
#[case(&["dose"], 2, "required", "stderr")]
#[case(&["dose", "--grams=-3"], 1, "positive", "stderr")]
#[case(&["calibrate"], 0, "Calibrated", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let mut cmd = cmd_in(&dir);
    for a in args {
        cmd.arg(a);
    }
    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => assert.stdout(predicate::str::contains(needle)),
        _ => assert.stderr(predicate::str::contains(needle)),
    };
}

#[test]
fn dose_json_output_is_machine_readable() {
    let dir = tempdir().unwrap();
    let out = cmd_in(&dir)
        .args(["--json", "dose", "--grams", "10"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["target_mg"], 10_000);
    assert!(v["final_mg"].is_i64());
    assert!(v["overshoot_mg"].is_i64());
}

#[test]
fn state_persists_between_invocations() {
    let dir = tempdir().unwrap();
    cmd_in(&dir)
        .args(["dose", "--grams", "10"])
        .assert()
        .success();
    let state = fs::read_to_string(dir.path().join("state.json")).unwrap();
    let v: serde_json::Value = serde_json::from_str(&state).unwrap();
    assert!(v.get("kv").is_some(), "learned bias not persisted: {state}");
    // the second run restores the bias and still completes
    cmd_in(&dir)
        .args(["dose", "--grams", "10"])
        .assert()
        .success();
}

#[test]
fn invalid_config_is_rejected_with_context() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[control]\nmeasure_timeout_ms = 0\n").unwrap();
    Command::cargo_bin("gravidose")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("measure_timeout_ms"));
}

#[test]
fn corrupt_state_file_is_reported() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state.json");
    fs::write(&state, "not json").unwrap();
    let mut cmd = Command::cargo_bin("gravidose").unwrap();
    cmd.arg("--config").arg(write_valid_config(&dir));
    cmd.arg("--state").arg(&state);
    cmd.arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("state"));
}
