//! Rule table turning trend and quality findings into prioritized,
//! evidence-backed suggestions.
//!
//! Rules are evaluated in a fixed order and each one that fires emits exactly
//! one [`Suggestion`]. The final list is stably sorted by [`Priority`], so
//! suggestions of equal priority keep rule-evaluation order. The always-on
//! follow-up rule guarantees the list is never empty.

use std::{collections::BTreeMap, fmt, fmt::Write as _};

use serde::{Serialize, Serializer};
use serde_json::{Value, json};

use crate::{
    config::Policy,
    data::{format_number, round_to},
    dataset::{Dataset, is_provenance_column},
    frequency::percent_of,
    quality::{ColumnNulls, IssueSeverity, QualityResult},
    trend::{TrendDirection, TrendResult},
};

const EVIDENCE_LIST_LIMIT: usize = 5;
const ACTIONS_IN_REPORT: usize = 3;
/// Integers up to 2^53 survive the f64 round trip exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionCategory {
    DataQuality,
    TrendInsight,
    Operational,
    Investigation,
    Optimization,
}

impl SuggestionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionCategory::DataQuality => "data_quality",
            SuggestionCategory::TrendInsight => "trend_insight",
            SuggestionCategory::Operational => "operational",
            SuggestionCategory::Investigation => "investigation",
            SuggestionCategory::Optimization => "optimization",
        }
    }
}

/// Closed set of value kinds a piece of evidence can take.
#[derive(Debug, Clone, PartialEq)]
pub enum EvidenceValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
    Map(BTreeMap<String, EvidenceValue>),
}

pub type Evidence = BTreeMap<String, EvidenceValue>;

impl Serialize for EvidenceValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EvidenceValue::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            EvidenceValue::Number(n) => serializer.serialize_f64(*n),
            EvidenceValue::Text(text) => serializer.serialize_str(text),
            EvidenceValue::List(items) => items.serialize(serializer),
            EvidenceValue::Map(map) => map.serialize(serializer),
        }
    }
}

impl From<f64> for EvidenceValue {
    fn from(value: f64) -> Self {
        EvidenceValue::Number(value)
    }
}

impl From<usize> for EvidenceValue {
    fn from(value: usize) -> Self {
        EvidenceValue::Number(value as f64)
    }
}

impl From<&str> for EvidenceValue {
    fn from(value: &str) -> Self {
        EvidenceValue::Text(value.to_string())
    }
}

impl From<String> for EvidenceValue {
    fn from(value: String) -> Self {
        EvidenceValue::Text(value)
    }
}

impl From<Vec<String>> for EvidenceValue {
    fn from(value: Vec<String>) -> Self {
        EvidenceValue::List(value)
    }
}

impl From<BTreeMap<String, EvidenceValue>> for EvidenceValue {
    fn from(value: BTreeMap<String, EvidenceValue>) -> Self {
        EvidenceValue::Map(value)
    }
}

fn evidence<const N: usize>(entries: [(&str, EvidenceValue); N]) -> Evidence {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: SuggestionCategory,
    pub actions: Vec<String>,
    pub evidence: Evidence,
}

impl Suggestion {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
        category: SuggestionCategory,
        actions: &[&str],
        evidence: Evidence,
    ) -> Self {
        debug_assert!(!evidence.is_empty(), "suggestions always carry evidence");
        Self {
            title: title.into(),
            description: description.into(),
            priority,
            category,
            actions: actions.iter().map(|action| action.to_string()).collect(),
            evidence,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "title": self.title,
            "description": self.description,
            "priority": self.priority,
            "category": self.category,
            "actions": self.actions,
            "evidence": self.evidence,
        })
    }
}

pub fn suggestions_to_value(suggestions: &[Suggestion]) -> Value {
    let by_priority = Priority::ALL
        .iter()
        .map(|priority| {
            let count = suggestions
                .iter()
                .filter(|s| s.priority == *priority)
                .count();
            (priority.as_str().to_string(), Value::from(count))
        })
        .collect::<serde_json::Map<_, _>>();
    json!({
        "total_suggestions": suggestions.len(),
        "by_priority": by_priority,
        "suggestions": suggestions.iter().map(Suggestion::to_value).collect::<Vec<_>>(),
    })
}

pub fn render_suggestions(suggestions: &[Suggestion]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Actionable Insights & Recommendations ===");
    let _ = writeln!(out, "Total Suggestions: {}", suggestions.len());
    for priority in Priority::ALL {
        let matching = suggestions
            .iter()
            .filter(|s| s.priority == priority)
            .collect::<Vec<_>>();
        if matching.is_empty() {
            continue;
        }
        let _ = writeln!(
            out,
            "\n{} Priority ({})",
            priority.as_str().to_uppercase(),
            matching.len()
        );
        for (idx, suggestion) in matching.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", idx + 1, suggestion.title);
            let _ = writeln!(out, "     {}", suggestion.description);
            let _ = writeln!(out, "     Category: {}", suggestion.category.as_str());
            let _ = writeln!(out, "     Recommended Actions:");
            for action in suggestion.actions.iter().take(ACTIONS_IN_REPORT) {
                let _ = writeln!(out, "       - {action}");
            }
        }
    }
    out
}

pub struct SuggestionEngine<'a> {
    policy: &'a Policy,
}

impl<'a> SuggestionEngine<'a> {
    pub fn new(policy: &'a Policy) -> Self {
        Self { policy }
    }

    pub fn generate(
        &self,
        dataset: &Dataset,
        trend: &TrendResult,
        quality: &QualityResult,
        source: &str,
    ) -> Vec<Suggestion> {
        let mut out = Vec::new();

        self.quality_score(quality, &mut out);
        self.critical_nulls(quality, &mut out);
        self.time_order(quality, &mut out);
        self.volume_increase(trend, &mut out);
        self.severity_share(trend, &mut out);
        self.source_concentration(dataset, trend, &mut out);
        volume_spikes(trend, &mut out);
        duplicates(quality, &mut out);
        self.category_concentration(dataset, trend, &mut out);
        self.resolution_time(dataset, &mut out);
        peak_hours(trend, &mut out);
        self.further_analysis(dataset, trend, source, &mut out);

        out.sort_by_key(|suggestion| suggestion.priority);
        out
    }

    fn quality_score(&self, quality: &QualityResult, out: &mut Vec<Suggestion>) {
        if quality.completeness.raw_score >= self.policy.quality_score_floor {
            return;
        }
        let score = quality.completeness.score;
        let high_issues = quality
            .issues_with(IssueSeverity::High)
            .map(|issue| issue.message.clone())
            .collect::<Vec<_>>();
        out.push(Suggestion::new(
            "Critical Data Quality Issues Detected",
            format!(
                "Data quality score is {}/100 (grade {}). High-severity issues found that may impact analysis accuracy.",
                score, quality.completeness.grade
            ),
            Priority::Critical,
            SuggestionCategory::DataQuality,
            &[
                "Review and fix missing values in critical columns",
                "Investigate duplicate records and determine root cause",
                "Validate data export process from source system",
                "Consider implementing data validation at ingestion time",
            ],
            evidence([
                ("score", score.into()),
                ("grade", quality.completeness.grade.as_str().into()),
                ("high_issues_count", high_issues.len().into()),
                (
                    "issues",
                    high_issues
                        .into_iter()
                        .take(EVIDENCE_LIST_LIMIT)
                        .collect::<Vec<_>>()
                        .into(),
                ),
            ]),
        ));
    }

    /// Critical columns above the null-rate threshold raise one CRITICAL
    /// suggestion; the remaining affected ones raise one HIGH suggestion.
    fn critical_nulls(&self, quality: &QualityResult, out: &mut Vec<Suggestion>) {
        let (severe, partial): (Vec<_>, Vec<_>) = quality
            .missing_data
            .critical_columns_affected()
            .partition(|column| column.null_percent > self.policy.critical_null_percent);
        if !severe.is_empty() {
            let names = severe.iter().map(|c| c.column.clone()).collect::<Vec<_>>();
            out.push(Suggestion::new(
                "Critical Fields Largely Empty",
                format!(
                    "More than {}% of values are missing in critical field(s): {}.",
                    format_number(self.policy.critical_null_percent),
                    names.join(", ")
                ),
                Priority::Critical,
                SuggestionCategory::DataQuality,
                &[
                    "Fix the export mapping for these fields before trusting the analysis",
                    "Confirm the fields are populated in the source system",
                    "Re-export the data once the integration is corrected",
                ],
                evidence([
                    ("null_percent_by_column", null_rates(&severe)),
                    ("threshold_percent", self.policy.critical_null_percent.into()),
                ]),
            ));
        }
        if !partial.is_empty() {
            out.push(Suggestion::new(
                "Critical Fields Have Missing Values",
                "Essential incident fields contain null values, which may indicate data collection issues.",
                Priority::High,
                SuggestionCategory::DataQuality,
                &[
                    "Audit the data pipeline for these fields",
                    "Set up alerts for null values in critical fields",
                    "Review integration configuration with source systems",
                ],
                evidence([("null_percent_by_column", null_rates(&partial))]),
            ));
        }
    }

    fn time_order(&self, quality: &QualityResult, out: &mut Vec<Suggestion>) {
        let Some(order) = quality.time_order.filter(|order| order.violations > 0) else {
            return;
        };
        let percent = order.violation_percent();
        let priority = if percent > self.policy.time_order_critical_percent {
            Priority::Critical
        } else {
            Priority::High
        };
        out.push(Suggestion::new(
            "Resolution Times Precede Creation Times",
            format!(
                "{} of {} records ({}%) have resolved_time before created_time.",
                order.violations,
                order.comparable,
                format_number(percent)
            ),
            priority,
            SuggestionCategory::DataQuality,
            &[
                "Check timezone handling between created and resolved timestamps",
                "Verify which source fields map to created_time and resolved_time",
                "Exclude affected records from resolution-time metrics until fixed",
            ],
            evidence([
                ("violations", order.violations.into()),
                ("comparable_records", order.comparable.into()),
                ("violation_percent", percent.into()),
            ]),
        ));
    }

    fn volume_increase(&self, trend: &TrendResult, out: &mut Vec<Suggestion>) {
        let Some(wow) = &trend.week_over_week else {
            return;
        };
        let Some(change) = wow.change_percent else {
            return;
        };
        if wow.direction != TrendDirection::Increasing || change <= self.policy.volume_increase_percent
        {
            return;
        }
        out.push(Suggestion::new(
            "Significant Increase in Incident Volume",
            format!("Incident volume increased by {change:.1}% compared to the previous week."),
            Priority::High,
            SuggestionCategory::TrendInsight,
            &[
                "Investigate root causes for the volume increase",
                "Check for new deployments or infrastructure changes",
                "Review alert thresholds - they may be too sensitive",
                "Analyze if increase is from a specific source/category",
            ],
            evidence([
                ("change_percent", change.into()),
                ("current_week_count", wow.current_count.into()),
                ("previous_week_count", wow.previous_count.into()),
                ("direction", wow.direction.as_str().into()),
            ]),
        ));
    }

    fn severity_share(&self, trend: &TrendResult, out: &mut Vec<Suggestion>) {
        let Some(severity) = &trend.severity else {
            return;
        };
        if severity.high_severity_percent <= self.policy.high_severity_percent {
            return;
        }
        let distribution = severity
            .distribution
            .iter()
            .map(|v| (v.value.clone(), EvidenceValue::from(v.count)))
            .collect::<BTreeMap<_, _>>();
        out.push(Suggestion::new(
            "High Proportion of Critical/High Severity Incidents",
            format!(
                "{:.1}% of rated incidents are high severity. This may indicate systemic issues or overly aggressive alerting.",
                severity.high_severity_percent
            ),
            Priority::High,
            SuggestionCategory::Operational,
            &[
                "Review severity classification criteria",
                "Audit high-severity alerts for false positives",
                "Investigate common patterns in high-severity incidents",
                "Consider severity auto-escalation rules",
            ],
            evidence([
                ("severity_column", severity.column.as_str().into()),
                ("high_severity_count", severity.high_severity_count.into()),
                (
                    "high_severity_percent",
                    round_to(severity.high_severity_percent, 1).into(),
                ),
                ("rated_records", severity.rated_count.into()),
                ("distribution", distribution.into()),
            ]),
        ));
    }

    fn source_concentration(
        &self,
        dataset: &Dataset,
        trend: &TrendResult,
        out: &mut Vec<Suggestion>,
    ) {
        for breakdown in &trend.sources {
            if is_provenance_column(&breakdown.column) {
                continue;
            }
            let Some(top) = breakdown.top_values.first() else {
                continue;
            };
            let percent = percent_of(top.count, dataset.len());
            if percent <= self.policy.source_concentration_percent {
                continue;
            }
            let investigate = format!("Investigate health and stability of '{}'", top.value);
            out.push(Suggestion::new(
                "Single Source Generating Most Incidents",
                format!(
                    "'{}' generates {percent:.1}% of all incidents from {}.",
                    top.value, breakdown.column
                ),
                Priority::High,
                SuggestionCategory::Investigation,
                &[
                    investigate.as_str(),
                    "Review monitoring configuration for this source",
                    "Consider dedicated runbooks for this source",
                    "Evaluate if infrastructure upgrade needed",
                ],
                evidence([
                    ("source_column", breakdown.column.as_str().into()),
                    ("top_source", top.value.as_str().into()),
                    ("incident_count", top.count.into()),
                    ("percentage", round_to(percent, 1).into()),
                ]),
            ));
        }
    }

    fn category_concentration(
        &self,
        dataset: &Dataset,
        trend: &TrendResult,
        out: &mut Vec<Suggestion>,
    ) {
        for category in &trend.categories {
            let Some(top) = category.top_values.first() else {
                continue;
            };
            let percent = percent_of(top.count, dataset.len());
            if percent <= self.policy.category_concentration_percent {
                continue;
            }
            let deep_dive = format!("Deep dive into '{}' incidents for root cause", top.value);
            out.push(Suggestion::new(
                format!("High Concentration in '{}'", category.column),
                format!(
                    "'{}' accounts for {percent:.1}% of all incidents. Consider targeted improvement.",
                    top.value
                ),
                Priority::Medium,
                SuggestionCategory::Optimization,
                &[
                    deep_dive.as_str(),
                    "Create automated remediation runbooks",
                    "Consider infrastructure improvements",
                    "Review if alert is adding value or just noise",
                ],
                evidence([
                    ("category", category.column.as_str().into()),
                    ("top_value", top.value.as_str().into()),
                    ("count", top.count.into()),
                    ("percentage", round_to(percent, 1).into()),
                ]),
            ));
        }
    }

    /// Mean time between created and resolved over records where it is
    /// positive.
    fn resolution_time(&self, dataset: &Dataset, out: &mut Vec<Suggestion>) {
        let mut hours = dataset
            .records()
            .filter_map(|record| {
                let opened = record.created_time()?;
                let closed = record.resolved_time()?;
                let elapsed = (closed - opened).num_seconds() as f64 / 3600.0;
                (elapsed > 0.0).then_some(elapsed)
            })
            .collect::<Vec<_>>();
        if hours.is_empty() {
            return;
        }
        let mean = hours.iter().sum::<f64>() / hours.len() as f64;
        if mean <= self.policy.resolution_hours {
            return;
        }
        hours.sort_by(f64::total_cmp);
        let mid = hours.len() / 2;
        let median = if hours.len() % 2 == 0 {
            (hours[mid - 1] + hours[mid]) / 2.0
        } else {
            hours[mid]
        };
        out.push(Suggestion::new(
            "Long Average Resolution Time",
            format!("Average resolution time is {mean:.1} hours (median: {median:.1} hours)."),
            Priority::Medium,
            SuggestionCategory::Operational,
            &[
                "Identify bottlenecks in resolution workflow",
                "Review escalation procedures",
                "Implement SLA monitoring and alerting",
                "Create troubleshooting guides for common issues",
            ],
            evidence([
                ("avg_resolution_hours", round_to(mean, 2).into()),
                ("median_resolution_hours", round_to(median, 2).into()),
                ("sample_size", hours.len().into()),
            ]),
        ));
    }

    fn further_analysis(
        &self,
        dataset: &Dataset,
        trend: &TrendResult,
        source: &str,
        out: &mut Vec<Suggestion>,
    ) {
        if dataset.column_count() > self.policy.correlation_min_columns {
            out.push(Suggestion::new(
                "Recommended: Correlation Analysis",
                "With multiple attributes, correlation analysis could reveal hidden patterns.",
                Priority::Low,
                SuggestionCategory::Optimization,
                &[
                    "Analyze correlation between incident categories and times",
                    "Look for patterns in source-severity relationships",
                    "Identify co-occurring incident types",
                ],
                evidence([
                    ("column_count", dataset.column_count().into()),
                    ("cross_tabulations", trend.correlations.len().into()),
                ]),
            ));
        }

        let days = trend
            .temporal
            .as_ref()
            .map(|temporal| temporal.daily_volume.days)
            .unwrap_or(0);
        if days > self.policy.forecasting_min_days {
            out.push(Suggestion::new(
                "Recommended: Volume Forecasting",
                "Sufficient historical data for incident volume forecasting.",
                Priority::Low,
                SuggestionCategory::Optimization,
                &[
                    "Build time series forecast for capacity planning",
                    "Set up anomaly detection on predicted vs actual",
                    "Plan staffing based on predicted volumes",
                ],
                evidence([("days_of_data", days.into())]),
            ));
        }

        let mut follow_up = evidence([
            ("total_records", dataset.len().into()),
            ("source", source.into()),
        ]);
        if let Some(range) = &trend.summary.date_range {
            follow_up.insert("span_days".to_string(), (range.span_days as f64).into());
        }
        out.push(Suggestion::new(
            "Recommended: Narrower Time-Window Review",
            "Re-run the trend review over narrower time windows to separate recurring patterns from one-off events.",
            Priority::Low,
            SuggestionCategory::Optimization,
            &[
                "Compare the most recent week against the same week last month",
                "Review business-hours and off-hours incidents separately",
                "Track the completeness score per export over time",
            ],
            follow_up,
        ));
    }
}

fn null_rates(columns: &[&ColumnNulls]) -> EvidenceValue {
    columns
        .iter()
        .map(|c| (c.column.clone(), EvidenceValue::from(c.null_percent)))
        .collect::<BTreeMap<_, _>>()
        .into()
}

fn volume_spikes(trend: &TrendResult, out: &mut Vec<Suggestion>) {
    let Some(anomalies) = trend.anomalies.as_ref().filter(|a| !a.spikes.is_empty()) else {
        return;
    };
    let spikes = anomalies
        .spikes
        .iter()
        .take(EVIDENCE_LIST_LIMIT)
        .map(|spike| (spike.date.to_string(), EvidenceValue::from(spike.count)))
        .collect::<BTreeMap<_, _>>();
    out.push(Suggestion::new(
        "Volume Spike Days Identified",
        format!(
            "Found {} days with abnormally high incident volumes.",
            anomalies.spikes.len()
        ),
        Priority::Medium,
        SuggestionCategory::Investigation,
        &[
            "Correlate spike dates with deployment calendars",
            "Check for infrastructure events on these dates",
            "Review if spikes align with known outages",
            "Consider implementing automatic scaling during peak periods",
        ],
        evidence([
            ("spike_days", anomalies.spikes.len().into()),
            ("threshold", round_to(anomalies.threshold, 2).into()),
            ("spikes", spikes.into()),
        ]),
    ));
}

fn duplicates(quality: &QualityResult, out: &mut Vec<Suggestion>) {
    let dups = &quality.duplicates;
    if !dups.has_any() {
        return;
    }
    let key_duplicates = dups
        .key_duplicates
        .iter()
        .map(|key| (key.column.clone(), EvidenceValue::from(key.duplicate_count)))
        .collect::<BTreeMap<_, _>>();
    let mut found = evidence([
        ("full_row_duplicates", dups.full_row_duplicates.into()),
        ("duplicate_percent", dups.duplicate_percent.into()),
    ]);
    if !key_duplicates.is_empty() {
        found.insert("key_duplicates".to_string(), key_duplicates.into());
    }
    out.push(Suggestion::new(
        "Duplicate Records Detected",
        format!(
            "{} duplicate rows found ({}% of data) and {} key column(s) with repeated values.",
            dups.full_row_duplicates,
            format_number(dups.duplicate_percent),
            dups.key_duplicates.len()
        ),
        Priority::Medium,
        SuggestionCategory::DataQuality,
        &[
            "De-duplicate data before analysis",
            "Check for duplicate webhook/API calls at source",
            "Review deduplication rules in monitoring tool",
        ],
        found,
    ));
}

fn peak_hours(trend: &TrendResult, out: &mut Vec<Suggestion>) {
    let Some(temporal) = trend.temporal.as_ref().filter(|t| !t.peak_hours.is_empty()) else {
        return;
    };
    let hours = temporal
        .peak_hours
        .iter()
        .map(|h| format!("{:02}:00", h.hour))
        .collect::<Vec<_>>();
    let counts = temporal
        .peak_hours
        .iter()
        .map(|h| (format!("{:02}:00", h.hour), EvidenceValue::from(h.count)))
        .collect::<BTreeMap<_, _>>();
    out.push(Suggestion::new(
        "Peak Incident Hours Identified",
        format!("Highest incident volume occurs at hours: {}", hours.join(", ")),
        Priority::Low,
        SuggestionCategory::Operational,
        &[
            "Ensure adequate on-call coverage during peak hours",
            "Schedule maintenance windows outside peak hours",
            "Consider automated remediation for common issues during peaks",
        ],
        evidence([("peak_hours", hours.into()), ("counts", counts.into())]),
    ));
}
