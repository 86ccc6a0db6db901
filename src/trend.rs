//! Temporal and categorical trend analysis.
//!
//! [`TrendAnalyzer::analyze()`] reads a normalized [`Dataset`] and returns a
//! fresh [`TrendResult`]. When no timestamp column can be located (or none of
//! its values parse) the temporal, week-over-week and anomaly sections are
//! `None`; categorical sections are still computed.

use std::{cmp::Reverse, collections::HashSet, fmt::Write as _};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    config::Policy,
    data::{format_number, round_to},
    dataset::{Dataset, is_provenance_column},
    frequency::{FrequencyCounter, NULL_LABEL, ValueCount, percent_of},
};

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const PEAK_HOURS_REPORTED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    Unknown,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
            TrendDirection::Unknown => "unknown",
        }
    }

    /// Symmetric dead-band around zero.
    pub fn classify(change_percent: f64, dead_band: f64) -> Self {
        if change_percent > dead_band {
            TrendDirection::Increasing
        } else if change_percent < -dead_band {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub span_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub total_records: usize,
    pub column_count: usize,
    pub time_column: Option<String>,
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourCount {
    pub hour: u32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyVolume {
    pub days: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalPatterns {
    /// Index = hour of day.
    pub hourly: Vec<usize>,
    /// Index 0 = Monday.
    pub weekday: Vec<usize>,
    /// Index 0 = January.
    pub monthly: Vec<usize>,
    pub peak_hour: u32,
    pub peak_day: Weekday,
    pub peak_hours: Vec<HourCount>,
    pub daily_volume: DailyVolume,
}

impl TemporalPatterns {
    pub fn peak_month(&self) -> Option<&'static str> {
        argmax(&self.monthly).map(|idx| MONTH_NAMES[idx])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekOverWeek {
    pub window_days: i64,
    pub current_start: NaiveDate,
    pub current_end: NaiveDate,
    pub current_count: usize,
    pub previous_count: usize,
    /// `None` when the previous window is empty or not fully observed.
    pub change_percent: Option<f64>,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeSpike {
    pub date: NaiveDate,
    pub count: usize,
    pub times_above_average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeAnomalies {
    pub days_observed: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub threshold: f64,
    pub spikes: Vec<VolumeSpike>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    pub column: String,
    pub unique_values: usize,
    pub top_values: Vec<ValueCount>,
    pub null_count: usize,
    pub null_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeverityBreakdown {
    pub column: String,
    pub distribution: Vec<ValueCount>,
    pub rated_count: usize,
    pub high_severity_count: usize,
    pub high_severity_percent: f64,
    pub null_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceBreakdown {
    pub column: String,
    pub unique_count: usize,
    pub top_values: Vec<ValueCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoOccurrence {
    pub left: String,
    pub right: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossTab {
    pub left_column: String,
    pub right_column: String,
    pub combinations: usize,
    pub top_pairs: Vec<CoOccurrence>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    pub summary: TrendSummary,
    pub temporal: Option<TemporalPatterns>,
    pub week_over_week: Option<WeekOverWeek>,
    pub anomalies: Option<VolumeAnomalies>,
    pub categories: Vec<CategoryBreakdown>,
    pub severity: Option<SeverityBreakdown>,
    pub sources: Vec<SourceBreakdown>,
    pub correlations: Vec<CrossTab>,
}

impl TrendResult {
    pub fn anomalous_dates(&self) -> Vec<NaiveDate> {
        self.anomalies
            .as_ref()
            .map(|a| a.spikes.iter().map(|spike| spike.date).collect())
            .unwrap_or_default()
    }

    pub fn has_time_data(&self) -> bool {
        self.temporal.is_some()
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Incident Trend Analysis Summary ===");
        let _ = writeln!(
            out,
            "Total Incidents Analyzed: {}",
            self.summary.total_records
        );
        if let Some(range) = &self.summary.date_range {
            let _ = writeln!(
                out,
                "Date Range: {} to {} ({} days)",
                range.start.date(),
                range.end.date(),
                range.span_days
            );
        }
        match &self.temporal {
            Some(temporal) => {
                let hours = temporal
                    .peak_hours
                    .iter()
                    .map(|h| format!("{:02}:00", h.hour))
                    .join(", ");
                let _ = writeln!(out, "Peak Hours: {hours}");
                let _ = writeln!(out, "Peak Day: {}", weekday_name(temporal.peak_day));
                if let Some(month) = temporal.peak_month() {
                    let _ = writeln!(out, "Peak Month: {month}");
                }
            }
            None => {
                let _ = writeln!(out, "No usable timestamp column; temporal analysis skipped");
            }
        }
        if let Some(wow) = &self.week_over_week {
            match wow.change_percent {
                Some(change) => {
                    let _ = writeln!(
                        out,
                        "Weekly Trend: {} ({change:+.1}%)",
                        wow.direction.as_str()
                    );
                }
                None => {
                    let _ = writeln!(out, "Weekly Trend: unknown (insufficient data)");
                }
            }
        }
        if let Some(severity) = &self.severity {
            let _ = writeln!(out, "Severity Column: {}", severity.column);
            let _ = writeln!(
                out,
                "High Severity Count: {} ({}%)",
                severity.high_severity_count,
                format_number(severity.high_severity_percent)
            );
        }
        for category in &self.categories {
            let top = category
                .top_values
                .iter()
                .take(3)
                .map(|v| format!("{} ({})", v.value, v.count))
                .join(", ");
            let _ = writeln!(out, "Top {}: {top}", category.column);
        }
        if let Some(anomalies) = &self.anomalies
            && !anomalies.spikes.is_empty()
        {
            let _ = writeln!(out, "Volume Spikes Detected: {}", anomalies.spikes.len());
        }
        out
    }
}

pub struct TrendAnalyzer<'a> {
    policy: &'a Policy,
}

impl<'a> TrendAnalyzer<'a> {
    pub fn new(policy: &'a Policy) -> Self {
        Self { policy }
    }

    pub fn analyze(&self, dataset: &Dataset) -> TrendResult {
        let time_column = self.find_time_column(dataset);
        let timestamps = time_column
            .as_deref()
            .and_then(|column| dataset.timestamp_column(column))
            .map(|parsed| parsed.values.iter().flatten().copied().collect::<Vec<_>>())
            .unwrap_or_default();

        let date_range = date_range(&timestamps);
        let daily = daily_counts(&timestamps);
        let temporal = (!timestamps.is_empty()).then(|| temporal_patterns(&timestamps, &daily));
        let week_over_week = self.week_over_week(&daily);
        let anomalies = self.detect_anomalies(&daily);

        let categorical = self.categorical_columns(dataset, time_column.as_deref());
        let categories = categorical
            .iter()
            .map(|column| self.category_breakdown(dataset, column))
            .collect();
        let correlations = self.correlations(dataset, &categorical);

        TrendResult {
            summary: TrendSummary {
                total_records: dataset.len(),
                column_count: dataset.column_count(),
                time_column,
                date_range,
            },
            temporal,
            week_over_week,
            anomalies,
            categories,
            severity: self.severity_breakdown(dataset),
            sources: self.source_breakdowns(dataset),
            correlations,
        }
    }

    /// Candidate names first, then any column that looks like a timestamp.
    /// A column only qualifies if at least one of its values parses.
    pub fn find_time_column(&self, dataset: &Dataset) -> Option<String> {
        let named = self
            .policy
            .time_column_candidates
            .iter()
            .copied()
            .filter(|name| dataset.has_column(name));
        let fallback = dataset.columns().iter().map(String::as_str).filter(|name| {
            let lowered = name.to_ascii_lowercase();
            lowered.contains("time") || lowered.contains("date")
        });
        named
            .chain(fallback)
            .find(|name| {
                dataset
                    .timestamp_column(name)
                    .is_some_and(|parsed| parsed.has_values())
            })
            .map(str::to_string)
    }

    fn week_over_week(&self, daily: &[(NaiveDate, usize)]) -> Option<WeekOverWeek> {
        let window = self.policy.trend_window_days;
        let (first, _) = *daily.first()?;
        let (latest, _) = *daily.last()?;
        let current_start = latest - Duration::days(window - 1);
        let previous_start = latest - Duration::days(window * 2 - 1);
        let count_between = |start: NaiveDate, end: NaiveDate| -> usize {
            daily
                .iter()
                .filter(|(date, _)| *date >= start && *date <= end)
                .map(|(_, count)| *count)
                .sum()
        };
        let current_count = count_between(current_start, latest);
        let previous_count = count_between(previous_start, current_start - Duration::days(1));

        let change_percent = (first <= previous_start && previous_count > 0).then(|| {
            round_to(
                (current_count as f64 - previous_count as f64) / previous_count as f64 * 100.0,
                2,
            )
        });
        let direction = change_percent
            .map(|change| TrendDirection::classify(change, self.policy.trend_dead_band_percent))
            .unwrap_or(TrendDirection::Unknown);

        Some(WeekOverWeek {
            window_days: window,
            current_start,
            current_end: latest,
            current_count,
            previous_count,
            change_percent,
            direction,
        })
    }

    /// Two-sigma rule over the per-day series (gap days count as zero).
    fn detect_anomalies(&self, daily: &[(NaiveDate, usize)]) -> Option<VolumeAnomalies> {
        if daily.len() < self.policy.min_anomaly_days {
            return None;
        }
        let counts = daily.iter().map(|(_, count)| *count).collect::<Vec<_>>();
        let (mean, std_dev) = mean_and_std_dev(&counts);
        let threshold = mean + self.policy.anomaly_sigma * std_dev;
        let spikes = daily
            .iter()
            .filter(|(_, count)| *count as f64 > threshold)
            .map(|(date, count)| VolumeSpike {
                date: *date,
                count: *count,
                times_above_average: if mean > 0.0 {
                    round_to(*count as f64 / mean, 2)
                } else {
                    0.0
                },
            })
            .collect();
        Some(VolumeAnomalies {
            days_observed: daily.len(),
            mean: round_to(mean, 4),
            std_dev: round_to(std_dev, 4),
            threshold: round_to(threshold, 4),
            spikes,
        })
    }

    /// Up to `categorical_limit` low-cardinality columns, domain columns first.
    pub fn categorical_columns(&self, dataset: &Dataset, time_column: Option<&str>) -> Vec<String> {
        let total = dataset.len();
        if total == 0 {
            return Vec::new();
        }
        let mut candidates = Vec::new();
        for (idx, column) in dataset.columns().iter().enumerate() {
            if is_provenance_column(column)
                || Some(column.as_str()) == time_column
                || dataset.is_parsed_timestamp(column)
                || self.policy.is_timestamp_name(column)
                || self.policy.is_key_column(column)
                || column.to_ascii_lowercase().ends_with("_id")
            {
                continue;
            }
            let Some(values) = dataset.column_values(column) else {
                continue;
            };
            let mut distinct = HashSet::new();
            let mut non_null = 0usize;
            for value in values.flatten() {
                non_null += 1;
                distinct.insert(value);
            }
            if non_null == 0 {
                continue;
            }
            let unique_ratio = distinct.len() as f64 / total as f64;
            if unique_ratio >= self.policy.categorical_max_unique_ratio {
                continue;
            }
            let rank = self
                .policy
                .categorical_priority
                .iter()
                .position(|name| name.eq_ignore_ascii_case(column))
                .unwrap_or(usize::MAX);
            candidates.push((rank, Reverse(non_null), idx, column.clone()));
        }
        candidates.sort();
        candidates
            .into_iter()
            .take(self.policy.categorical_limit)
            .map(|(_, _, _, column)| column)
            .collect()
    }

    fn category_breakdown(&self, dataset: &Dataset, column: &str) -> CategoryBreakdown {
        let counter = column_counter(dataset, column);
        let null_count = dataset.null_count(column).unwrap_or(0);
        CategoryBreakdown {
            column: column.to_string(),
            unique_values: counter.distinct(),
            top_values: counter.value_counts(self.policy.top_values, dataset.len()),
            null_count,
            null_percent: percent_of(null_count, dataset.len()),
        }
    }

    fn severity_breakdown(&self, dataset: &Dataset) -> Option<SeverityBreakdown> {
        let column = self
            .policy
            .severity_columns
            .iter()
            .find(|name| dataset.has_column(name))?;
        let counter = column_counter(dataset, column);
        let high_severity_count = dataset
            .column_values(column)?
            .flatten()
            .filter(|value| self.policy.is_high_severity(value))
            .count();
        let rated_count = counter.total();
        Some(SeverityBreakdown {
            column: column.to_string(),
            distribution: counter.value_counts(0, rated_count),
            rated_count,
            high_severity_count,
            high_severity_percent: percent_of(high_severity_count, rated_count),
            null_count: dataset.null_count(column).unwrap_or(0),
        })
    }

    fn source_breakdowns(&self, dataset: &Dataset) -> Vec<SourceBreakdown> {
        self.policy
            .source_columns
            .iter()
            .filter(|name| dataset.has_column(name))
            .map(|column| {
                let counter = column_counter(dataset, column);
                SourceBreakdown {
                    column: column.to_string(),
                    unique_count: counter.distinct(),
                    top_values: counter.value_counts(self.policy.top_values, dataset.len()),
                }
            })
            .collect()
    }

    fn correlations(&self, dataset: &Dataset, categorical: &[String]) -> Vec<CrossTab> {
        categorical
            .iter()
            .take(self.policy.correlation_columns)
            .tuple_combinations()
            .filter_map(|(left, right)| {
                let left_idx = dataset.column_index(left)?;
                let right_idx = dataset.column_index(right)?;
                let mut counter = FrequencyCounter::new();
                for row in dataset.rows() {
                    let l = row[left_idx].as_deref().unwrap_or(NULL_LABEL).to_string();
                    let r = row[right_idx].as_deref().unwrap_or(NULL_LABEL).to_string();
                    counter.ingest((l, r));
                }
                let top_pairs = counter
                    .sorted(self.policy.correlation_top_pairs)
                    .into_iter()
                    .map(|((left, right), count)| CoOccurrence { left, right, count })
                    .collect();
                Some(CrossTab {
                    left_column: left.clone(),
                    right_column: right.clone(),
                    combinations: counter.distinct(),
                    top_pairs,
                })
            })
            .collect()
    }
}

fn column_counter(dataset: &Dataset, column: &str) -> FrequencyCounter<String> {
    dataset
        .column_values(column)
        .map(FrequencyCounter::from_values)
        .unwrap_or_default()
}

fn date_range(timestamps: &[NaiveDateTime]) -> Option<DateRange> {
    let start = *timestamps.iter().min()?;
    let end = *timestamps.iter().max()?;
    Some(DateRange {
        start,
        end,
        span_days: (end - start).num_days(),
    })
}

/// Per-day counts over the full calendar range, gap days included as zero.
fn daily_counts(timestamps: &[NaiveDateTime]) -> Vec<(NaiveDate, usize)> {
    let mut counter = FrequencyCounter::new();
    for ts in timestamps {
        counter.ingest(ts.date());
    }
    let Some(first) = timestamps.iter().map(NaiveDateTime::date).min() else {
        return Vec::new();
    };
    let Some(last) = timestamps.iter().map(NaiveDateTime::date).max() else {
        return Vec::new();
    };
    let counts = counter.sorted(0).into_iter().collect::<std::collections::BTreeMap<_, _>>();
    first
        .iter_days()
        .take_while(|date| *date <= last)
        .map(|date| (date, counts.get(&date).copied().unwrap_or(0)))
        .collect()
}

fn temporal_patterns(
    timestamps: &[NaiveDateTime],
    daily: &[(NaiveDate, usize)],
) -> TemporalPatterns {
    let mut hourly = vec![0usize; 24];
    let mut weekday = vec![0usize; 7];
    let mut monthly = vec![0usize; 12];
    for ts in timestamps {
        hourly[ts.hour() as usize] += 1;
        weekday[ts.weekday().num_days_from_monday() as usize] += 1;
        monthly[ts.month0() as usize] += 1;
    }
    let peak_hour = argmax(&hourly).unwrap_or(0) as u32;
    let peak_day = WEEKDAYS[argmax(&weekday).unwrap_or(0)];

    let mut peak_hours = hourly
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(hour, count)| HourCount {
            hour: hour as u32,
            count: *count,
        })
        .collect::<Vec<_>>();
    peak_hours.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.hour.cmp(&b.hour)));
    peak_hours.truncate(PEAK_HOURS_REPORTED);

    let counts = daily.iter().map(|(_, count)| *count).collect::<Vec<_>>();
    let (mean, std_dev) = mean_and_std_dev(&counts);
    let daily_volume = DailyVolume {
        days: counts.len(),
        mean: round_to(mean, 2),
        std_dev: round_to(std_dev, 2),
        min: counts.iter().copied().min().unwrap_or(0),
        max: counts.iter().copied().max().unwrap_or(0),
    };

    TemporalPatterns {
        hourly,
        weekday,
        monthly,
        peak_hour,
        peak_day,
        peak_hours,
        daily_volume,
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Index of the largest bucket; ties resolve to the lowest index.
fn argmax(counts: &[usize]) -> Option<usize> {
    let max = *counts.iter().max()?;
    if max == 0 {
        return None;
    }
    counts.iter().position(|count| *count == max)
}

/// Mean and population standard deviation.
fn mean_and_std_dev(counts: &[usize]) -> (f64, f64) {
    if counts.is_empty() {
        return (0.0, 0.0);
    }
    let n = counts.len() as f64;
    let mean = counts.iter().map(|c| *c as f64).sum::<f64>() / n;
    let variance = counts
        .iter()
        .map(|c| {
            let diff = *c as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_symmetric_dead_band() {
        assert_eq!(TrendDirection::classify(5.0, 5.0), TrendDirection::Stable);
        assert_eq!(TrendDirection::classify(-5.0, 5.0), TrendDirection::Stable);
        assert_eq!(TrendDirection::classify(5.01, 5.0), TrendDirection::Increasing);
        assert_eq!(TrendDirection::classify(-5.01, 5.0), TrendDirection::Decreasing);
    }

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[1, 3, 3, 0]), Some(1));
        assert_eq!(argmax(&[0, 0]), None);
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn population_std_dev_of_uniform_series_is_zero() {
        let (mean, std_dev) = mean_and_std_dev(&[4, 4, 4, 4]);
        assert_eq!(mean, 4.0);
        assert_eq!(std_dev, 0.0);
        let (_, std_dev) = mean_and_std_dev(&[2, 4, 4, 4, 5, 5, 7, 9]);
        assert_eq!(std_dev, 2.0);
    }

    #[test]
    fn daily_counts_fill_gap_days_with_zero() {
        let day = |d: u32| {
            NaiveDate::from_ymd_opt(2025, 3, d)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap()
        };
        let series = daily_counts(&[day(1), day(1), day(4)]);
        let counts = series.iter().map(|(_, c)| *c).collect::<Vec<_>>();
        assert_eq!(counts, vec![2, 0, 0, 1]);
    }
}
