//! Runs the built binary end to end.

use std::fs;
use std::process::{Command, Output};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_energy-ledger"))
        .args(args)
        .env("RUST_LOG", "error")
        .output()
        .expect("failed to run energy-ledger")
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("energy-ledger-cli-{}-{name}", std::process::id()))
}

#[test]
fn synthetic_winter_day_prints_ledger_and_summary() {
    let ledger = temp_path("ledger.csv");
    let output = run(&[
        "--scenario",
        "winter",
        "--now",
        "2024-01-15T12:00:00Z",
        "--ledger-out",
        ledger.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--- Summary ---"));
    assert!(stdout.contains("Unpriced hours:        0"));
    assert!(stdout.contains("(partial)"));

    // local midnight through the 13:00 partial hour
    let csv = fs::read_to_string(&ledger).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert!(lines[0].starts_with("period_start,period_end,partial,"));
    assert_eq!(lines.len(), 1 + 14);
    fs::remove_file(ledger).ok();
}

#[test]
fn same_seed_gives_identical_output() {
    let args = ["--scenario", "flaky_load_sensor", "--seed", "9", "--now", "2024-06-01T10:00:00Z"];
    let a = run(&args);
    let b = run(&args);
    assert!(a.status.success());
    assert_eq!(a.stdout, b.stdout);

    let other = run(&["--scenario", "flaky_load_sensor", "--seed", "10", "--now", "2024-06-01T10:00:00Z"]);
    assert_ne!(a.stdout, other.stdout);
}

#[test]
fn fees_flag_raises_the_bill() {
    let base = ["--scenario", "winter", "--now", "2024-01-15T18:00:00Z"];
    let spot = run(&base);
    let mut with_fees_args = base.to_vec();
    with_fees_args.push("--include-fees");
    let with_fees = run(&with_fees_args);

    let cost = |out: &Output| -> f64 {
        String::from_utf8_lossy(&out.stdout)
            .lines()
            .find_map(|l| l.strip_prefix("Import cost / gain:"))
            .and_then(|rest| rest.split('/').next())
            .and_then(|v| v.trim().parse().ok())
            .expect("import cost line")
    };
    assert!(cost(&with_fees) > cost(&spot));
}

#[test]
fn telemetry_file_without_prices_uses_synthetic_curve() {
    let telemetry = temp_path("telemetry.csv");
    let mut csv = String::from("timestamp,channel,watts\n");
    for minute in 0..60 {
        let stamp = format!("2024-06-01T08:{minute:02}:00Z");
        for (channel, watts) in [("solar", 1000), ("load", 700), ("grid_net", -300), ("battery_net", 0)] {
            csv.push_str(&format!("{stamp},{channel},{watts}\n"));
        }
    }
    fs::write(&telemetry, csv).unwrap();

    let output = run(&["--telemetry", telemetry.to_str().unwrap(), "--preset", "strict"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Flagged instants:      0 of 60"));
    fs::remove_file(telemetry).ok();
}

#[test]
fn unknown_preset_exits_nonzero() {
    let output = run(&["--preset", "lenient"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown preset"));
}

#[test]
fn unknown_scenario_exits_nonzero() {
    let output = run(&["--scenario", "monsoon", "--now", "2024-06-01T10:00:00Z"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown scenario"));
}

#[test]
fn malformed_now_exits_nonzero() {
    let output = run(&["--now", "yesterday"]);
    assert_eq!(output.status.code(), Some(1));
}
