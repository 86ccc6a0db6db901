mod common;

use common::{daily_series, dataset, fixture_path};
use incident_insights::{
    config::AnalysisConfig,
    loader::{LoadOptions, load_file},
    pipeline::{self, AnalysisOutcome},
    quality::Grade,
    suggest::{Priority, Suggestion, SuggestionCategory, suggestions_to_value},
};
use serde_json::json;

fn titles(outcome: &AnalysisOutcome) -> Vec<&str> {
    outcome
        .suggestions
        .iter()
        .map(|suggestion| suggestion.title.as_str())
        .collect()
}

fn find<'a>(outcome: &'a AnalysisOutcome, title: &str) -> &'a Suggestion {
    outcome
        .suggestions
        .iter()
        .find(|suggestion| suggestion.title == title)
        .unwrap_or_else(|| panic!("no suggestion titled {title:?} in {:?}", titles(outcome)))
}

fn assert_well_formed(outcome: &AnalysisOutcome) {
    assert!(!outcome.suggestions.is_empty());
    assert!(
        outcome
            .suggestions
            .windows(2)
            .all(|pair| pair[0].priority <= pair[1].priority)
    );
    for suggestion in &outcome.suggestions {
        assert!(!suggestion.evidence.is_empty(), "{}", suggestion.title);
    }
}

#[test]
fn clean_single_record_still_gets_follow_up() {
    let data = dataset(&["id", "title"], &[vec!["1", "Disk full on db-01"]]);
    let outcome = pipeline::analyze(&data, "unknown", &AnalysisConfig::default());
    assert_well_formed(&outcome);
    assert_eq!(titles(&outcome), vec!["Recommended: Narrower Time-Window Review"]);
    assert_eq!(outcome.suggestions[0].priority, Priority::Low);
}

#[test]
fn low_quality_score_is_critical() {
    let data = dataset(
        &["id", "title", "severity"],
        &[
            vec!["1", "", ""],
            vec!["2", "", ""],
            vec!["3", "", ""],
            vec!["4", "", ""],
        ],
    );
    let outcome = pipeline::analyze(&data, "unknown", &AnalysisConfig::default());
    assert_well_formed(&outcome);
    let first = &outcome.suggestions[0];
    assert_eq!(first.title, "Critical Data Quality Issues Detected");
    assert_eq!(first.priority, Priority::Critical);
    assert_eq!(first.category, SuggestionCategory::DataQuality);
    let value = first.to_value();
    assert_eq!(value["evidence"]["grade"], json!("F"));
    assert_eq!(value["category"], json!("data_quality"));

    let second = &outcome.suggestions[1];
    assert_eq!(second.title, "Critical Fields Largely Empty");
    assert_eq!(second.priority, Priority::Critical);
}

#[test]
fn widespread_time_order_violations_are_critical() {
    let data = dataset(
        &["id", "title", "created_time", "resolved_time"],
        &[
            vec!["1", "Disk full on db-01", "2025-01-02 10:00:00", "2025-01-02 09:00:00"],
            vec!["2", "API latency high", "2025-01-03 10:00:00", "2025-01-03 08:00:00"],
        ],
    );
    let outcome = pipeline::analyze(&data, "unknown", &AnalysisConfig::default());
    assert_well_formed(&outcome);
    let suggestion = outcome
        .suggestions
        .iter()
        .find(|s| s.title == "Resolution Times Precede Creation Times")
        .unwrap();
    assert_eq!(suggestion.priority, Priority::Critical);
    assert_eq!(suggestion.to_value()["evidence"]["violations"], json!(2));
}

#[test]
fn weekly_volume_increase_is_high_priority() {
    let mut counts = vec![2usize; 7];
    counts.extend([4usize; 7]);
    let outcome = pipeline::analyze(
        &daily_series(&counts),
        "unknown",
        &AnalysisConfig::default(),
    );
    assert_well_formed(&outcome);
    assert_eq!(
        titles(&outcome),
        vec![
            "Significant Increase in Incident Volume",
            "Peak Incident Hours Identified",
            "Recommended: Narrower Time-Window Review",
        ]
    );
    let increase = &outcome.suggestions[0];
    assert_eq!(increase.priority, Priority::High);
    assert_eq!(increase.category, SuggestionCategory::TrendInsight);
    let evidence = &increase.to_value()["evidence"];
    assert_eq!(evidence["change_percent"], json!(100));
    assert_eq!(evidence["current_week_count"], json!(28));
    assert_eq!(evidence["direction"], json!("increasing"));
}

#[test]
fn newrelic_export_produces_ordered_evidence_backed_list() {
    let loaded = load_file(
        &fixture_path("newrelic_incidents.csv"),
        &AnalysisConfig::default(),
        &LoadOptions::default(),
    )
    .unwrap();
    let outcome = pipeline::analyze(&loaded.dataset, &loaded.source, &AnalysisConfig::default());
    assert_well_formed(&outcome);
    let titles = titles(&outcome);
    assert!(titles.contains(&"High Proportion of Critical/High Severity Incidents"));
    assert!(titles.contains(&"Recommended: Correlation Analysis"));
    assert_eq!(titles.last(), Some(&"Recommended: Narrower Time-Window Review"));

    let value = suggestions_to_value(&outcome.suggestions);
    assert_eq!(value["total_suggestions"], json!(outcome.suggestions.len()));
    let counted: u64 = ["critical", "high", "medium", "low"]
        .iter()
        .map(|key| value["by_priority"][key].as_u64().unwrap())
        .sum();
    assert_eq!(counted as usize, outcome.suggestions.len());
}

#[test]
fn score_just_under_floor_is_critical_even_when_it_rounds_to_seventy() {
    let ids = (0..27).map(|i| format!("INC{i:03}")).collect::<Vec<_>>();
    let summaries = (0..27)
        .map(|i| format!("Service outage number {i}"))
        .collect::<Vec<_>>();
    // 8 of 81 optional cells filled: (2 * 3 + 8 / 27) / 9 is just below 70.
    let rows = ids
        .iter()
        .zip(&summaries)
        .enumerate()
        .map(|(i, (id, summary))| {
            vec![
                id.as_str(),
                summary.as_str(),
                if i < 3 { "checked cabling" } else { "" },
                if i < 3 { "network team" } else { "" },
                if i < 2 { "eu-west" } else { "" },
            ]
        })
        .collect::<Vec<_>>();
    let data = dataset(&["id", "title", "notes", "owner", "region"], &rows);
    let outcome = pipeline::analyze(&data, "unknown", &AnalysisConfig::default());
    assert_well_formed(&outcome);

    let completeness = &outcome.quality.completeness;
    assert_eq!(completeness.score, 70.0);
    assert!(completeness.raw_score < 70.0);
    assert_eq!(completeness.grade, Grade::D);

    let first = &outcome.suggestions[0];
    assert_eq!(first.title, "Critical Data Quality Issues Detected");
    assert_eq!(first.priority, Priority::Critical);
    let evidence = &first.to_value()["evidence"];
    assert_eq!(evidence["score"], json!(70));
    assert_eq!(evidence["grade"], json!("D"));
}

#[test]
fn spike_days_are_medium_with_dates_in_evidence() {
    let mut counts = vec![10usize; 14];
    counts[9] = 50;
    let outcome = pipeline::analyze(
        &daily_series(&counts),
        "unknown",
        &AnalysisConfig::default(),
    );
    assert_well_formed(&outcome);
    let spikes = find(&outcome, "Volume Spike Days Identified");
    assert_eq!(spikes.priority, Priority::Medium);
    assert_eq!(spikes.category, SuggestionCategory::Investigation);
    let evidence = &spikes.to_value()["evidence"];
    assert_eq!(evidence["spike_days"], json!(1));
    assert_eq!(evidence["spikes"], json!({"2025-01-10": 50}));
    assert!(evidence["threshold"].is_number());
}

#[test]
fn duplicate_rows_and_keys_are_medium() {
    let data = dataset(
        &["id", "title"],
        &[
            vec!["1", "Disk full on db-01"],
            vec!["1", "Disk full on db-01"],
            vec!["2", "API latency high"],
            vec!["3", "Queue backlog growing"],
        ],
    );
    let outcome = pipeline::analyze(&data, "unknown", &AnalysisConfig::default());
    assert_well_formed(&outcome);
    let dups = find(&outcome, "Duplicate Records Detected");
    assert_eq!(dups.priority, Priority::Medium);
    assert_eq!(dups.category, SuggestionCategory::DataQuality);
    let evidence = &dups.to_value()["evidence"];
    assert_eq!(evidence["full_row_duplicates"], json!(1));
    assert_eq!(evidence["duplicate_percent"], json!(25));
    assert_eq!(evidence["key_duplicates"], json!({"id": 1}));
}

#[test]
fn dominant_source_is_high_priority() {
    let data = dataset(
        &["id", "title", "source"],
        &[
            vec!["1", "Disk full on db-01", "api-gw"],
            vec!["2", "API latency high", "api-gw"],
            vec!["3", "Queue backlog growing", "api-gw"],
            vec!["4", "Replica lag on db-02", "db-02"],
        ],
    );
    let outcome = pipeline::analyze(&data, "unknown", &AnalysisConfig::default());
    assert_well_formed(&outcome);
    let source = find(&outcome, "Single Source Generating Most Incidents");
    assert_eq!(source.priority, Priority::High);
    assert_eq!(source.category, SuggestionCategory::Investigation);
    let evidence = &source.to_value()["evidence"];
    assert_eq!(evidence["source_column"], json!("source"));
    assert_eq!(evidence["top_source"], json!("api-gw"));
    assert_eq!(evidence["incident_count"], json!(3));
    assert_eq!(evidence["percentage"], json!(75));
}

#[test]
fn concentrated_category_is_medium() {
    let summaries = (0..10)
        .map(|i| format!("Link flap on switch {i}"))
        .collect::<Vec<_>>();
    let rows = summaries
        .iter()
        .enumerate()
        .map(|(i, summary)| {
            vec![
                if i % 2 == 0 { "a" } else { "b" },
                summary.as_str(),
                if i < 7 { "network" } else { "database" },
            ]
        })
        .collect::<Vec<_>>();
    let data = dataset(&["shift", "title", "category"], &rows);
    let outcome = pipeline::analyze(&data, "unknown", &AnalysisConfig::default());
    assert_well_formed(&outcome);
    let concentration = find(&outcome, "High Concentration in 'category'");
    assert_eq!(concentration.priority, Priority::Medium);
    assert_eq!(concentration.category, SuggestionCategory::Optimization);
    let evidence = &concentration.to_value()["evidence"];
    assert_eq!(evidence["category"], json!("category"));
    assert_eq!(evidence["top_value"], json!("network"));
    assert_eq!(evidence["count"], json!(7));
    assert_eq!(evidence["percentage"], json!(70));
}

#[test]
fn long_resolution_times_are_medium() {
    let data = dataset(
        &["id", "title", "created_time", "resolved_time"],
        &[
            vec!["1", "Disk full on db-01", "2025-01-01 00:00:00", "2025-01-02 06:00:00"],
            vec!["2", "API latency high", "2025-01-03 00:00:00", "2025-01-05 02:00:00"],
        ],
    );
    let outcome = pipeline::analyze(&data, "unknown", &AnalysisConfig::default());
    assert_well_formed(&outcome);
    let slow = find(&outcome, "Long Average Resolution Time");
    assert_eq!(slow.priority, Priority::Medium);
    assert_eq!(slow.category, SuggestionCategory::Operational);
    let evidence = &slow.to_value()["evidence"];
    assert_eq!(evidence["avg_resolution_hours"], json!(40));
    assert_eq!(evidence["median_resolution_hours"], json!(40));
    assert_eq!(evidence["sample_size"], json!(2));
}

#[test]
fn sparse_gaps_in_critical_fields_are_high() {
    let ids = (1..=10).map(|i| i.to_string()).collect::<Vec<_>>();
    let summaries = (0..10)
        .map(|i| format!("Certificate expiry on web-{i}"))
        .collect::<Vec<_>>();
    let rows = ids
        .iter()
        .zip(&summaries)
        .enumerate()
        .map(|(i, (id, summary))| {
            vec![id.as_str(), summary.as_str(), if i == 0 { "" } else { "low" }]
        })
        .collect::<Vec<_>>();
    let data = dataset(&["id", "title", "severity"], &rows);
    let outcome = pipeline::analyze(&data, "unknown", &AnalysisConfig::default());
    assert_well_formed(&outcome);
    assert!(!titles(&outcome).contains(&"Critical Fields Largely Empty"));
    let gaps = find(&outcome, "Critical Fields Have Missing Values");
    assert_eq!(gaps.priority, Priority::High);
    assert_eq!(gaps.category, SuggestionCategory::DataQuality);
    assert_eq!(
        gaps.to_value()["evidence"]["null_percent_by_column"],
        json!({"severity": 10})
    );
}
