use assert_cmd::Command;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

// Fast simulation: millisecond periods and a kettle that heats 2 °C per sample.
fn write_fast_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[temperature]
heatup_delta = 1.0
sample_interval_ms = 5
max_read_failures = 10
room_temperature = 20.0

[timing]
prenotify_ms = 20
response_timeout_ms = 2000
watchdog_poll_ms = 5

[hop_cooking]
temperature = 32.0
prenotify_delta = 3.0
prenotify_ms = 20

[logging]
temperature_delta = 1.0
time_delta_ms = 50

[hardware]
thermometer = "simulated"
sim_heat_per_sample = 2.0
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write_recipe(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
id = "pils-1"
name = "Quick Pils"

[mashing]
[[mashing.levels]]
start_ms = 0
duration_ms = 100
temperature = 25.0

[[mashing.levels]]
start_ms = 100
duration_ms = 100
temperature = 29.0

[[mashing.malt]]
name = "Pilsner"
amount = 4.5
unit = "kg"
input_ms = 0

[hop_cooking]
duration_ms = 200

[[hop_cooking.hops]]
name = "Saaz"
amount = 30.0
unit = "g"
input_ms = 50
"#;
    let path = dir.path().join("recipe.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write_overlapping_recipe(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
id = "broken"

[mashing]
[[mashing.levels]]
start_ms = 0
duration_ms = 500
temperature = 50.0

[[mashing.levels]]
start_ms = 100
duration_ms = 100
temperature = 64.0

[[mashing.malt]]
name = "Pilsner"
amount = 4.5
unit = "kg"
input_ms = 0
"#;
    let path = dir.path().join("broken.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["decode", "452"], 0, "Request/HopCooking/Adding", "stdout")]
#[case(&["decode", "999"], 0, "Normal/NotStarted/Ongoing", "stdout")]
#[case(&["encode", "cancel", "mashing", "iodine"], 0, "243", "stdout")]
#[case(&["encode", "request", "boiling", "start"], 2, "invalid value", "stderr")]
#[case(&["validate"], 2, "required", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let mut cmd = Command::cargo_bin("brewctl").unwrap();
    for a in args {
        cmd.arg(a);
    }
    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn decode_json_names_the_triple() {
    let out = Command::cargo_bin("brewctl")
        .unwrap()
        .args(["--json", "decode", "213"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["code"], 213);
    assert_eq!(v["type"], "Cancel");
    assert_eq!(v["phase"], "Mashing");
    assert_eq!(v["position"], "Start");
}

#[test]
fn validate_accepts_good_and_rejects_overlap() {
    let dir = tempdir().unwrap();
    let good = write_recipe(&dir);
    Command::cargo_bin("brewctl")
        .unwrap()
        .arg("validate")
        .arg("--recipe")
        .arg(&good)
        .assert()
        .success()
        .stdout(predicate::str::contains("pils-1 (Quick Pils) is valid"));

    let bad = write_overlapping_recipe(&dir);
    Command::cargo_bin("brewctl")
        .unwrap()
        .arg("validate")
        .arg("--recipe")
        .arg(&bad)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("overlaps"));
}

#[test]
fn invalid_config_is_reported_as_json() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[timing]\nwatchdog_poll_ms = 0\n").unwrap();
    let out = Command::cargo_bin("brewctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["--json", "decode", "111"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));
    let v: serde_json::Value = serde_json::from_slice(&out.stderr).unwrap();
    assert_eq!(v["reason"], "InvalidInput");
    assert!(v["message"].as_str().unwrap().contains("watchdog_poll_ms"));
}

#[test]
fn auto_confirmed_brew_completes_and_writes_log() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let recipe = write_recipe(&dir);
    let logs = dir.path().join("logs");

    Command::cargo_bin("brewctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["--log-level", "warn", "brew", "--auto-confirm", "--recipe"])
        .arg(&recipe)
        .arg("--log-dir")
        .arg(&logs)
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("brewing complete: recipe pils-1"))
        .stdout(predicate::str::contains("request: Request/Mashing/Start"));

    let written = fs::read_to_string(logs.join("brew-1.json")).unwrap();
    let log: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(log["recipe"]["id"], "pils-1");
    assert!(written.contains("BrewingComplete"));
    assert!(written.contains("HopAddition"));
}

#[test]
fn operator_cancel_from_stdin_exits_aborted() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);
    let recipe = write_recipe(&dir);

    // "c" cancels the first request; closing stdin acknowledges the cancellation.
    Command::cargo_bin("brewctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["brew", "--recipe"])
        .arg(&recipe)
        .write_stdin("c\n")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .code(4)
        .stderr(predicate::str::contains("aborted (Cancelled)"));
}

#[test]
fn time_scale_must_be_positive() {
    let dir = tempdir().unwrap();
    let recipe = write_recipe(&dir);
    Command::cargo_bin("brewctl")
        .unwrap()
        .args(["brew", "--auto-confirm", "--time-scale", "0", "--recipe"])
        .arg(&recipe)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("--time-scale"));
}
