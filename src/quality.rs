//! Data-quality checks and completeness scoring.
//!
//! [`QualityAnalyzer::analyze()`] runs every check against a read-only
//! [`Dataset`] and returns a [`QualityResult`] holding both the detailed
//! findings and the flat [`Issue`] list the suggestion engine consumes.
//! Nothing in here fails: an empty dataset yields score 0, grade F and a
//! single `empty-dataset` issue.

use std::{
    collections::{BTreeSet, HashSet},
    fmt::{self, Write as _},
};

use itertools::Itertools;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::{
    config::{Policy, SourceRegistry},
    data::{format_number, is_numeric_token, round_to},
    dataset::{Dataset, StandardField, is_provenance_column},
    frequency::{FrequencyCounter, ValueCount, percent_of},
};

const SAMPLE_LIMIT: usize = 5;
const KEY_DUPLICATE_SAMPLES: usize = 5;
const REPORT_ISSUES_PER_SEVERITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    CriticalNull,
    DuplicateKey,
    DuplicateRow,
    TimeOrderViolation,
    UnparseableDate,
    NonNumericValue,
    PlaceholderValue,
    ShortText,
    CaseInconsistency,
    MissingExpectedField,
    EmptyDataset,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::CriticalNull => "critical-null",
            IssueKind::DuplicateKey => "duplicate-key",
            IssueKind::DuplicateRow => "duplicate-row",
            IssueKind::TimeOrderViolation => "time-order-violation",
            IssueKind::UnparseableDate => "unparseable-date",
            IssueKind::NonNumericValue => "non-numeric-value",
            IssueKind::PlaceholderValue => "placeholder-value",
            IssueKind::ShortText => "short-text",
            IssueKind::CaseInconsistency => "case-inconsistency",
            IssueKind::MissingExpectedField => "missing-expected-field",
            IssueKind::EmptyDataset => "empty-dataset",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    High,
    Medium,
    Low,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::High => "high",
            IssueSeverity::Medium => "medium",
            IssueSeverity::Low => "low",
        }
    }

    /// Label attached to a column's null rate.
    pub fn for_null_percent(percent: f64) -> Self {
        if percent > 50.0 {
            IssueSeverity::High
        } else if percent > 10.0 {
            IssueSeverity::Medium
        } else {
            IssueSeverity::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub count: usize,
    pub message: String,
}

impl Issue {
    fn new(
        kind: IssueKind,
        severity: IssueSeverity,
        column: Option<&str>,
        count: usize,
        message: String,
    ) -> Self {
        Self {
            kind,
            severity,
            column: column.map(str::to_string),
            count,
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Grade::A
        } else if score >= 80.0 {
            Grade::B
        } else if score >= 70.0 {
            Grade::C
        } else if score >= 60.0 {
            Grade::D
        } else {
            Grade::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySummary {
    pub total_rows: usize,
    pub total_columns: usize,
    pub total_cells: usize,
    pub null_cells: usize,
    pub overall_fill_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnNulls {
    pub column: String,
    pub null_count: usize,
    pub null_percent: f64,
    pub level: IssueSeverity,
    pub critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingData {
    pub columns_with_nulls: usize,
    pub by_column: Vec<ColumnNulls>,
}

impl MissingData {
    pub fn critical_columns_affected(&self) -> impl Iterator<Item = &ColumnNulls> {
        self.by_column.iter().filter(|column| column.critical)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyDuplicates {
    pub column: String,
    pub duplicate_count: usize,
    pub top_values: Vec<ValueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Duplicates {
    pub full_row_duplicates: usize,
    pub duplicate_percent: f64,
    pub key_duplicates: Vec<KeyDuplicates>,
}

impl Duplicates {
    pub fn has_any(&self) -> bool {
        self.full_row_duplicates > 0 || !self.key_duplicates.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedType {
    Datetime,
    Numeric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeIssue {
    pub column: String,
    pub expected: ExpectedType,
    pub bad_count: usize,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueIssue {
    pub column: String,
    pub kind: IssueKind,
    pub count: usize,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseInconsistency {
    pub column: String,
    pub variants: Vec<String>,
    pub normalized: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeOrder {
    /// Records with both timestamps parsed.
    pub comparable: usize,
    pub violations: usize,
}

impl TimeOrder {
    pub fn violation_percent(&self) -> f64 {
        percent_of(self.violations, self.comparable)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completeness {
    /// Rounded to one decimal place.
    pub score: f64,
    /// Unrounded score; grade and the quality floor are judged on this.
    #[serde(skip)]
    pub raw_score: f64,
    pub grade: Grade,
    pub issues_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityResult {
    pub source: String,
    pub summary: QualitySummary,
    pub missing_data: MissingData,
    pub duplicates: Duplicates,
    pub type_issues: Vec<TypeIssue>,
    pub value_issues: Vec<ValueIssue>,
    pub case_inconsistencies: Vec<CaseInconsistency>,
    pub time_order: Option<TimeOrder>,
    pub missing_expected_fields: Vec<String>,
    pub completeness: Completeness,
    pub issues: Vec<Issue>,
}

impl QualityResult {
    pub fn issues_with(&self, severity: IssueSeverity) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .filter(move |issue| issue.severity == severity)
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }

    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Data Quality Analysis Report ===");
        let _ = writeln!(
            out,
            "Dataset: {} rows x {} columns",
            self.summary.total_rows, self.summary.total_columns
        );
        let _ = writeln!(
            out,
            "Overall Fill Rate: {}%",
            format_number(self.summary.overall_fill_rate)
        );
        let _ = writeln!(
            out,
            "Completeness Score: {}/100 (Grade: {})",
            self.completeness.score, self.completeness.grade
        );
        let _ = writeln!(out, "Issues Found: {}", self.issues.len());
        for severity in [IssueSeverity::High, IssueSeverity::Medium, IssueSeverity::Low] {
            let matching = self.issues_with(severity).collect::<Vec<_>>();
            if matching.is_empty() {
                continue;
            }
            let _ = writeln!(
                out,
                "{} Severity Issues ({}):",
                capitalize(severity.as_str()),
                matching.len()
            );
            for issue in matching.iter().take(REPORT_ISSUES_PER_SEVERITY) {
                let _ = writeln!(out, "  - {}", issue.message);
            }
        }
        if self.duplicates.full_row_duplicates > 0 {
            let _ = writeln!(
                out,
                "Duplicate Rows: {}",
                self.duplicates.full_row_duplicates
            );
        }
        out
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

pub struct QualityAnalyzer<'a> {
    registry: &'a SourceRegistry,
    policy: &'a Policy,
    placeholder: Option<Regex>,
}

impl<'a> QualityAnalyzer<'a> {
    pub fn new(registry: &'a SourceRegistry, policy: &'a Policy) -> Self {
        Self {
            registry,
            policy,
            placeholder: placeholder_regex(&policy.placeholder_tokens),
        }
    }

    pub fn analyze(&self, dataset: &Dataset, source: &str) -> QualityResult {
        let mut issues = Vec::new();

        let summary = summarize(dataset);
        let missing_data = self.check_missing(dataset, &mut issues);
        let duplicates = self.check_duplicates(dataset, &mut issues);
        let type_issues = self.check_types(dataset, &mut issues);
        let time_order = check_time_order(dataset, &mut issues);
        let value_issues = self.check_values(dataset, &mut issues);
        let case_inconsistencies = self.check_case(dataset, &mut issues);
        let missing_expected_fields = self.check_expected_fields(dataset, source, &mut issues);

        if dataset.is_empty() {
            issues.push(Issue::new(
                IssueKind::EmptyDataset,
                IssueSeverity::High,
                None,
                0,
                "Dataset contains no records".to_string(),
            ));
        }
        let raw_score = self.completeness_score(dataset, duplicates.full_row_duplicates);
        let completeness = Completeness {
            score: round_to(raw_score, 1),
            raw_score,
            grade: Grade::from_score(raw_score),
            issues_count: issues.len(),
        };

        QualityResult {
            source: source.to_string(),
            summary,
            missing_data,
            duplicates,
            type_issues,
            value_issues,
            case_inconsistencies,
            time_order,
            missing_expected_fields,
            completeness,
            issues,
        }
    }

    fn check_missing(&self, dataset: &Dataset, issues: &mut Vec<Issue>) -> MissingData {
        let mut by_column = Vec::new();
        for column in dataset.columns() {
            let null_count = dataset.null_count(column).unwrap_or(0);
            if null_count == 0 {
                continue;
            }
            let null_percent = percent_of(null_count, dataset.len());
            let critical = self.policy.is_critical_column(column);
            if critical {
                issues.push(Issue::new(
                    IssueKind::CriticalNull,
                    IssueSeverity::High,
                    Some(column.as_str()),
                    null_count,
                    format!(
                        "Critical column '{column}' has {null_count} ({}%) missing values",
                        format_number(null_percent)
                    ),
                ));
            }
            by_column.push(ColumnNulls {
                column: column.clone(),
                null_count,
                null_percent,
                level: IssueSeverity::for_null_percent(null_percent),
                critical,
            });
        }
        MissingData {
            columns_with_nulls: by_column.len(),
            by_column,
        }
    }

    fn check_duplicates(&self, dataset: &Dataset, issues: &mut Vec<Issue>) -> Duplicates {
        let full_row_duplicates = full_row_duplicates(dataset);
        let mut key_duplicates = Vec::new();
        for column in dataset.columns() {
            if !self.policy.is_key_column(column) {
                continue;
            }
            let Some(values) = dataset.column_values(column) else {
                continue;
            };
            let counter = FrequencyCounter::from_values(values);
            let colliding = counter
                .sorted(0)
                .into_iter()
                .filter(|(_, count)| *count > 1)
                .collect::<Vec<_>>();
            if colliding.is_empty() {
                continue;
            }
            let duplicate_count: usize = colliding.iter().map(|(_, count)| count - 1).sum();
            let top_values = colliding
                .into_iter()
                .take(KEY_DUPLICATE_SAMPLES)
                .map(|(value, count)| ValueCount {
                    value,
                    count,
                    percent: percent_of(count, dataset.len()),
                })
                .collect();
            issues.push(Issue::new(
                IssueKind::DuplicateKey,
                IssueSeverity::High,
                Some(column.as_str()),
                duplicate_count,
                format!("Found {duplicate_count} duplicate values in key column '{column}'"),
            ));
            key_duplicates.push(KeyDuplicates {
                column: column.clone(),
                duplicate_count,
                top_values,
            });
        }
        if full_row_duplicates > 0 {
            issues.push(Issue::new(
                IssueKind::DuplicateRow,
                IssueSeverity::Medium,
                None,
                full_row_duplicates,
                format!("Found {full_row_duplicates} fully duplicate rows"),
            ));
        }
        Duplicates {
            full_row_duplicates,
            duplicate_percent: percent_of(full_row_duplicates, dataset.len()),
            key_duplicates,
        }
    }

    fn check_types(&self, dataset: &Dataset, issues: &mut Vec<Issue>) -> Vec<TypeIssue> {
        let mut found = Vec::new();
        for column in dataset.data_columns() {
            if self.policy.is_numeric_name(column) {
                let Some(values) = dataset.column_values(column) else {
                    continue;
                };
                let bad = values
                    .flatten()
                    .filter(|value| !is_numeric_token(value))
                    .collect::<Vec<_>>();
                if bad.is_empty() {
                    continue;
                }
                issues.push(Issue::new(
                    IssueKind::NonNumericValue,
                    IssueSeverity::Medium,
                    Some(column),
                    bad.len(),
                    format!(
                        "Column '{column}' has {} values that are not numeric",
                        bad.len()
                    ),
                ));
                found.push(TypeIssue {
                    column: column.to_string(),
                    expected: ExpectedType::Numeric,
                    bad_count: bad.len(),
                    samples: samples(bad),
                });
            } else if self.policy.is_timestamp_name(column) {
                let Some(parsed) = dataset.timestamp_column(column) else {
                    continue;
                };
                if parsed.unparseable == 0 {
                    continue;
                }
                issues.push(Issue::new(
                    IssueKind::UnparseableDate,
                    IssueSeverity::Medium,
                    Some(column),
                    parsed.unparseable,
                    format!(
                        "Column '{column}' has {} values that cannot be parsed as datetime",
                        parsed.unparseable
                    ),
                ));
                found.push(TypeIssue {
                    column: column.to_string(),
                    expected: ExpectedType::Datetime,
                    bad_count: parsed.unparseable,
                    samples: parsed.unparseable_samples.clone(),
                });
            }
        }
        found
    }

    fn check_values(&self, dataset: &Dataset, issues: &mut Vec<Issue>) -> Vec<ValueIssue> {
        let mut found = Vec::new();
        for column in dataset.data_columns() {
            let Some(values) = dataset.column_values(column) else {
                continue;
            };
            let placeholders = values
                .flatten()
                .filter(|value| self.is_placeholder(value))
                .collect::<Vec<_>>();
            if !placeholders.is_empty() {
                issues.push(Issue::new(
                    IssueKind::PlaceholderValue,
                    IssueSeverity::Low,
                    Some(column),
                    placeholders.len(),
                    format!(
                        "Column '{column}' has {} placeholder or blank values",
                        placeholders.len()
                    ),
                ));
                found.push(ValueIssue {
                    column: column.to_string(),
                    kind: IssueKind::PlaceholderValue,
                    count: placeholders.len(),
                    samples: samples(placeholders),
                });
            }

            if !self.is_text_column(column) {
                continue;
            }
            let Some(values) = dataset.column_values(column) else {
                continue;
            };
            let short = values
                .flatten()
                .filter(|value| value.chars().count() < self.policy.min_text_length)
                .collect::<Vec<_>>();
            if short.is_empty() {
                continue;
            }
            issues.push(Issue::new(
                IssueKind::ShortText,
                IssueSeverity::Low,
                Some(column),
                short.len(),
                format!(
                    "Column '{column}' has {} values shorter than {} characters",
                    short.len(),
                    self.policy.min_text_length
                ),
            ));
            found.push(ValueIssue {
                column: column.to_string(),
                kind: IssueKind::ShortText,
                count: short.len(),
                samples: samples(short),
            });
        }
        found
    }

    fn is_placeholder(&self, value: &str) -> bool {
        value.trim().is_empty()
            || self
                .placeholder
                .as_ref()
                .is_some_and(|regex| regex.is_match(value))
    }

    fn is_text_column(&self, column: &str) -> bool {
        let lowered = column.to_ascii_lowercase();
        self.policy
            .text_columns
            .iter()
            .any(|name| lowered.contains(name))
    }

    fn check_case(&self, dataset: &Dataset, issues: &mut Vec<Issue>) -> Vec<CaseInconsistency> {
        let mut found = Vec::new();
        for column in self.policy.enumerated_columns.iter().copied() {
            let Some(values) = dataset.column_values(column) else {
                continue;
            };
            let variants = values.flatten().collect::<BTreeSet<_>>();
            let normalized = variants
                .iter()
                .map(|value| value.to_lowercase())
                .collect::<BTreeSet<_>>();
            if normalized.len() == variants.len() {
                continue;
            }
            issues.push(Issue::new(
                IssueKind::CaseInconsistency,
                IssueSeverity::Low,
                Some(column),
                variants.len() - normalized.len(),
                format!("Column '{column}' has case inconsistencies (e.g., 'High' vs 'high')"),
            ));
            found.push(CaseInconsistency {
                column: column.to_string(),
                variants: variants.into_iter().map(str::to_string).collect(),
                normalized: normalized.into_iter().collect(),
            });
        }
        found
    }

    fn check_expected_fields(
        &self,
        dataset: &Dataset,
        source: &str,
        issues: &mut Vec<Issue>,
    ) -> Vec<String> {
        let Some(profile) = self.registry.get(source) else {
            return Vec::new();
        };
        let missing = profile
            .expected_fields
            .iter()
            .filter(|field| !dataset.has_column(field))
            .cloned()
            .collect::<Vec<_>>();
        for field in &missing {
            issues.push(Issue::new(
                IssueKind::MissingExpectedField,
                IssueSeverity::Medium,
                Some(field.as_str()),
                0,
                format!("Expected field '{field}' is missing from the {source} export"),
            ));
        }
        missing
    }

    /// Weighted fill rate over data columns minus the duplicate-row penalty,
    /// clamped to `[0, 100]`. Unrounded.
    pub fn completeness_score(&self, dataset: &Dataset, duplicate_rows: usize) -> f64 {
        if dataset.is_empty() {
            return 0.0;
        }
        let total = dataset.len() as f64;
        let mut total_weight = 0.0;
        let mut weighted_fill = 0.0;
        for column in dataset.data_columns() {
            let nulls = dataset.null_count(column).unwrap_or(0) as f64;
            let weight = if self.policy.is_critical_column(column) {
                self.policy.critical_weight
            } else {
                self.policy.optional_weight
            };
            total_weight += weight;
            weighted_fill += (1.0 - nulls / total) * weight;
        }
        if total_weight == 0.0 {
            return 0.0;
        }
        let score = weighted_fill / total_weight * 100.0;
        let penalty = duplicate_rows as f64 / total * self.policy.duplicate_penalty;
        (score - penalty).clamp(0.0, 100.0)
    }
}

fn summarize(dataset: &Dataset) -> QualitySummary {
    let total_cells = dataset.len() * dataset.column_count();
    let null_cells = dataset
        .rows()
        .iter()
        .flatten()
        .filter(|cell| cell.is_none())
        .count();
    let overall_fill_rate = if total_cells == 0 {
        0.0
    } else {
        round_to((1.0 - null_cells as f64 / total_cells as f64) * 100.0, 2)
    };
    QualitySummary {
        total_rows: dataset.len(),
        total_columns: dataset.column_count(),
        total_cells,
        null_cells,
        overall_fill_rate,
    }
}

/// Rows identical to an earlier row on every data column.
pub fn full_row_duplicates(dataset: &Dataset) -> usize {
    let indices = dataset
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| !is_provenance_column(name))
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();
    let mut seen = HashSet::with_capacity(dataset.len());
    dataset
        .rows()
        .iter()
        .filter(|row| {
            let key = indices
                .iter()
                .map(|idx| row[*idx].as_deref())
                .collect::<Vec<_>>();
            !seen.insert(key)
        })
        .count()
}

fn check_time_order(dataset: &Dataset, issues: &mut Vec<Issue>) -> Option<TimeOrder> {
    let created = StandardField::CreatedTime.as_str();
    let resolved = StandardField::ResolvedTime.as_str();
    if !dataset.has_column(created) || !dataset.has_column(resolved) {
        return None;
    }
    let mut comparable = 0usize;
    let mut violations = 0usize;
    for record in dataset.records() {
        if let (Some(opened), Some(closed)) = (record.created_time(), record.resolved_time()) {
            comparable += 1;
            if closed < opened {
                violations += 1;
            }
        }
    }
    if violations > 0 {
        issues.push(Issue::new(
            IssueKind::TimeOrderViolation,
            IssueSeverity::High,
            None,
            violations,
            format!("{violations} records have resolved_time before created_time"),
        ));
    }
    Some(TimeOrder {
        comparable,
        violations,
    })
}

/// Whole-value, case-insensitive match on the placeholder tokens.
fn placeholder_regex(tokens: &[&str]) -> Option<Regex> {
    let alternation = tokens.iter().map(|token| regex::escape(token)).join("|");
    let pattern = format!(r"^\s*(?:{alternation})\s*$");
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()
}

fn samples(values: Vec<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(*value))
        .take(SAMPLE_LIMIT)
        .map(str::to_string)
        .collect()
}
