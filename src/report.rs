//! Console and JSON projections of a pipeline run.

use std::{fmt::Write as _, fs, io::Write, path::Path};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::{
    data::format_number,
    dataset::Dataset,
    frequency::percent_of,
    loader::{BatchMetadata, FileMetadata},
    pipeline::AnalysisOutcome,
    quality::QualityResult,
    suggest::{render_suggestions, suggestions_to_value},
    table::TextTable,
    trend::{TrendResult, weekday_name},
};

#[derive(Debug, Serialize)]
pub struct AnalysisReport<'a> {
    pub generated_at: String,
    pub source: &'a str,
    pub metadata: &'a BatchMetadata,
    pub trend_analysis: &'a TrendResult,
    pub quality_analysis: &'a QualityResult,
    pub suggestions: Value,
}

impl<'a> AnalysisReport<'a> {
    pub fn new(metadata: &'a BatchMetadata, outcome: &'a AnalysisOutcome) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            source: &outcome.source,
            metadata,
            trend_analysis: &outcome.trend,
            quality_analysis: &outcome.quality,
            suggestions: suggestions_to_value(&outcome.suggestions),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Serializing analysis report to JSON")
    }
}

pub fn render_text(metadata: &BatchMetadata, outcome: &AnalysisOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Incident Analysis Report");
    let _ = writeln!(
        out,
        "Source: {} | Files: {} | Rows: {}",
        outcome.source, metadata.total_files, metadata.total_rows
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", render_files(&metadata.files));
    let _ = writeln!(out, "{}", render_trend(&outcome.trend));
    let _ = writeln!(out, "{}", render_quality(&outcome.quality));
    let _ = write!(out, "{}", render_suggestions(&outcome.suggestions));
    out
}

pub fn render_files(files: &[FileMetadata]) -> String {
    let mut table = TextTable::new(&["file", "size_mb", "rows", "columns", "source"]);
    for file in files {
        table.push_row([
            file.file_name.clone(),
            format_number(file.file_size_mb),
            file.row_count.to_string(),
            file.column_count.to_string(),
            file.detected_source.clone(),
        ]);
    }
    table.render()
}

pub fn render_trend(trend: &TrendResult) -> String {
    let mut out = trend.summary();
    if let Some(temporal) = &trend.temporal {
        let mut table = TextTable::new(&["weekday", "incidents"]);
        for (idx, count) in temporal.weekday.iter().enumerate() {
            let day = chrono::Weekday::try_from(idx as u8)
                .map(weekday_name)
                .unwrap_or("?");
            table.push_row([day.to_string(), count.to_string()]);
        }
        let _ = writeln!(out);
        let _ = write!(out, "{}", table.render());
    }
    for category in &trend.categories {
        let mut table = TextTable::new(&[category.column.as_str(), "count", "percent"]);
        for value in &category.top_values {
            table.push_row([
                value.value.clone(),
                value.count.to_string(),
                format_number(value.percent),
            ]);
        }
        let _ = writeln!(out);
        let _ = write!(out, "{}", table.render());
    }
    for crosstab in &trend.correlations {
        let mut table = TextTable::new(&[
            crosstab.left_column.as_str(),
            crosstab.right_column.as_str(),
            "count",
        ]);
        for pair in &crosstab.top_pairs {
            table.push_row([pair.left.clone(), pair.right.clone(), pair.count.to_string()]);
        }
        let _ = writeln!(out);
        let _ = write!(out, "{}", table.render());
    }
    out
}

pub fn render_quality(quality: &QualityResult) -> String {
    let mut out = quality.report();
    if !quality.missing_data.by_column.is_empty() {
        let mut table = TextTable::new(&["column", "nulls", "percent", "level", "critical"]);
        for column in &quality.missing_data.by_column {
            table.push_row([
                column.column.clone(),
                column.null_count.to_string(),
                format_number(column.null_percent),
                column.level.as_str().to_string(),
                (if column.critical { "yes" } else { "" }).to_string(),
            ]);
        }
        let _ = writeln!(out);
        let _ = write!(out, "{}", table.render());
    }
    out
}

/// Detected source, candidate scores and per-column fill rates for one file.
pub fn render_info(file: &FileMetadata, dataset: &Dataset) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "File: {}", file.file_name);
    let _ = writeln!(
        out,
        "Detected source: {} (score {})",
        file.detected_source, file.detection.score
    );
    if !file.detection.matched_columns.is_empty() {
        let _ = writeln!(
            out,
            "Matched signature columns: {}",
            file.detection.matched_columns.join(", ")
        );
    }
    let _ = writeln!(out);

    let mut candidates = TextTable::new(&["source", "score", "signature"]);
    for candidate in &file.detection.candidates {
        candidates.push_row([
            candidate.source.clone(),
            candidate.score.to_string(),
            candidate.signature_len.to_string(),
        ]);
    }
    let _ = writeln!(out, "{}", candidates.render());

    let mut columns = TextTable::new(&["#", "column", "non_null", "fill_percent"]);
    for (idx, column) in dataset.columns().iter().enumerate() {
        let nulls = dataset.null_count(column).unwrap_or(0);
        let filled = dataset.len() - nulls;
        columns.push_row([
            (idx + 1).to_string(),
            column.clone(),
            filled.to_string(),
            format_number(percent_of(filled, dataset.len())),
        ]);
    }
    let _ = write!(out, "{}", columns.render());
    out
}

/// Writes `content` to `path`, or stdout when no path is given.
pub fn write_output(content: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("Writing report to {path:?}"))
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(content.as_bytes())
                .context("Writing report to stdout")?;
            if !content.ends_with('\n') {
                writeln!(handle).context("Writing report to stdout")?;
            }
            handle.flush().context("Flushing stdout")
        }
    }
}
