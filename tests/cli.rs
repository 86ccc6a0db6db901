mod common;

use assert_cmd::Command;
use common::{TestWorkspace, daily_series_csv, fixture_path};
use predicates::{prelude::PredicateBooleanExt, str::contains};
use serde_json::Value;

fn bin() -> Command {
    Command::cargo_bin("incident-insights").expect("binary exists")
}

#[test]
fn analyze_prints_text_report() {
    let input = fixture_path("servicenow_incidents.csv");
    bin()
        .args(["analyze", "-i", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(
            contains("Source: servicenow")
                .and(contains("=== Incident Trend Analysis Summary ==="))
                .and(contains("Completeness Score: 99.2/100 (Grade: A)"))
                .and(contains("Recommended: Narrower Time-Window Review")),
        );
}

#[test]
fn analyze_writes_json_report_to_file() {
    let workspace = TestWorkspace::new();
    let output = workspace.path().join("report.json");
    let input = fixture_path("newrelic_incidents.csv");
    bin()
        .args([
            "analyze",
            "-i",
            input.to_str().unwrap(),
            "--format",
            "json",
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = std::fs::read_to_string(&output).expect("report written");
    let report: Value = serde_json::from_str(&contents).expect("valid json");
    assert_eq!(report["source"], "newrelic");
    assert_eq!(report["metadata"]["total_rows"], 8);
    assert_eq!(report["trend_analysis"]["summary"]["total_records"], 8);
    assert!(report["quality_analysis"]["completeness"]["score"].is_number());
    let suggestions = report["suggestions"]["suggestions"].as_array().unwrap();
    assert!(!suggestions.is_empty());
    assert_eq!(
        report["suggestions"]["total_suggestions"].as_u64().unwrap() as usize,
        suggestions.len()
    );
    assert!(report["generated_at"].is_string());
}

#[test]
fn analyze_accepts_multiple_inputs() {
    let newrelic = fixture_path("newrelic_incidents.csv");
    let moogsoft = fixture_path("moogsoft_alerts.csv");
    let assert = bin()
        .args([
            "analyze",
            "-i",
            newrelic.to_str().unwrap(),
            "-i",
            moogsoft.to_str().unwrap(),
            "--format",
            "json",
        ])
        .assert()
        .success();
    let report: Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("valid json on stdout");
    assert_eq!(report["source"], "unknown");
    assert_eq!(report["metadata"]["total_files"], 2);
    assert_eq!(report["metadata"]["total_rows"], 12);
    assert_eq!(report["metadata"]["files"][1]["detected_source"], "moogsoft");
}

#[test]
fn analyze_reads_stdin() {
    let mut counts = vec![2usize; 7];
    counts.extend([5usize; 7]);
    bin()
        .args(["analyze", "-i", "-"])
        .write_stdin(daily_series_csv(&counts))
        .assert()
        .success()
        .stdout(contains("Significant Increase in Incident Volume").and(contains("stdin")));
}

#[test]
fn quality_stage_emits_json() {
    let input = fixture_path("moogsoft_alerts.csv");
    let assert = bin()
        .args(["quality", "-i", input.to_str().unwrap(), "--format", "json"])
        .assert()
        .success();
    let report: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["source"], "moogsoft");
    assert!(report["quality_analysis"]["issues"].is_array());
    assert!(report.get("trend_analysis").is_none());
}

#[test]
fn trends_stage_renders_weekday_table() {
    let input = fixture_path("newrelic_incidents.csv");
    bin()
        .args(["trends", "-i", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("weekday").and(contains("Peak Day: Saturday")));
}

#[test]
fn info_reports_detection_and_fill_rates() {
    let input = fixture_path("servicenow_incidents.csv");
    bin()
        .args(["info", "-i", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(
            contains("Detected source: servicenow")
                .and(contains("fill_percent"))
                .and(contains("resolved_time")),
        );
}

#[test]
fn sources_lists_builtin_registry() {
    bin()
        .args(["sources"])
        .assert()
        .success()
        .stdout(
            contains("newrelic")
                .and(contains("moogsoft"))
                .and(contains("servicenow")),
        );
    bin()
        .args(["sources", "--yaml"])
        .assert()
        .success()
        .stdout(contains("sources:").and(contains("name: newrelic")));
}

#[test]
fn missing_input_fails_with_message() {
    bin()
        .args(["analyze", "-i", "does-not-exist.csv"])
        .assert()
        .failure()
        .stderr(contains("File not found"));
}

#[test]
fn unsupported_extension_fails() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("export.json", "[]");
    bin()
        .args(["quality", "-i", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("Unsupported file format: .json"));
}
