//! `analyze`, `quality`, `trends` and `info` command handlers.

use anyhow::{Context, Result};
use log::info;
use serde_json::json;

use crate::{
    cli::{AnalyzeArgs, InfoArgs, InputArgs, OutputFormat, StageArgs},
    config::AnalysisConfig,
    io_utils,
    loader::{self, LoadOptions, LoadedBatch},
    pipeline,
    quality::QualityAnalyzer,
    report::{self, AnalysisReport},
    trend::TrendAnalyzer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Quality,
    Trends,
}

fn load_inputs(input: &InputArgs) -> Result<(AnalysisConfig, LoadedBatch)> {
    let config = AnalysisConfig::load(input.config.as_deref())
        .context("Loading analysis configuration")?;
    let options = LoadOptions {
        delimiter: input.delimiter,
        encoding: io_utils::resolve_encoding(input.input_encoding.as_deref())?,
    };
    let batch = loader::load_files(&input.inputs, &config, &options)?;
    Ok((config, batch))
}

pub fn execute(args: &AnalyzeArgs) -> Result<()> {
    let (config, batch) = load_inputs(&args.input)?;
    info!(
        "Analyzing {} row(s) from {} file(s) as '{}'",
        batch.metadata.total_rows, batch.metadata.total_files, batch.source
    );
    let outcome = pipeline::analyze(&batch.dataset, &batch.source, &config);

    let rendered = match args.format {
        OutputFormat::Json => AnalysisReport::new(&batch.metadata, &outcome).to_json()?,
        OutputFormat::Text => report::render_text(&batch.metadata, &outcome),
    };
    report::write_output(&rendered, args.output.as_deref())?;
    info!(
        "Completeness score {} (grade {}), {} suggestion(s)",
        outcome.quality.completeness.score,
        outcome.quality.completeness.grade,
        outcome.suggestions.len()
    );
    Ok(())
}

pub fn execute_stage(args: &StageArgs, stage: Stage) -> Result<()> {
    let (config, batch) = load_inputs(&args.input)?;
    let rendered = match stage {
        Stage::Quality => {
            let result = QualityAnalyzer::new(&config.registry, &config.policy)
                .analyze(&batch.dataset, &batch.source);
            info!(
                "Quality analysis found {} issue(s); score {}",
                result.issues.len(),
                result.completeness.score
            );
            match args.format {
                OutputFormat::Json => serde_json::to_string_pretty(&json!({
                    "source": batch.source,
                    "metadata": batch.metadata,
                    "quality_analysis": result,
                }))
                .context("Serializing quality analysis to JSON")?,
                OutputFormat::Text => report::render_quality(&result),
            }
        }
        Stage::Trends => {
            let result = TrendAnalyzer::new(&config.policy).analyze(&batch.dataset);
            info!(
                "Trend analysis covered {} record(s)",
                result.summary.total_records
            );
            match args.format {
                OutputFormat::Json => serde_json::to_string_pretty(&json!({
                    "source": batch.source,
                    "metadata": batch.metadata,
                    "trend_analysis": result,
                }))
                .context("Serializing trend analysis to JSON")?,
                OutputFormat::Text => report::render_trend(&result),
            }
        }
    };
    report::write_output(&rendered, args.output.as_deref())
}

pub fn execute_info(args: &InfoArgs) -> Result<()> {
    let config = AnalysisConfig::load(args.config.as_deref())
        .context("Loading analysis configuration")?;
    let options = LoadOptions {
        delimiter: args.delimiter,
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
    };
    let loaded = loader::load_file(&args.input, &config, &options)?;
    let rendered = report::render_info(&loaded.metadata, &loaded.dataset);
    report::write_output(&rendered, None)
}
