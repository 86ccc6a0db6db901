use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use encoding_rs::Encoding;
use log::{info, warn};
use serde::Serialize;

use crate::{
    config::AnalysisConfig,
    data::round_to,
    dataset::{Dataset, SOURCE_FILE_COLUMN, SOURCE_SYSTEM_COLUMN, UNKNOWN_SOURCE},
    io_utils,
    normalize::{self, Detection},
};

const RECOMMENDED_MAX_MB: f64 = 100.0;
const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: encoding_rs::UTF_8,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileMetadata {
    pub file_name: String,
    pub file_size_mb: f64,
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub detected_source: String,
    pub detection: Detection,
}

#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub dataset: Dataset,
    pub source: String,
    pub metadata: FileMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchMetadata {
    pub files: Vec<FileMetadata>,
    pub total_rows: usize,
    pub total_files: usize,
}

#[derive(Debug, Clone)]
pub struct LoadedBatch {
    pub dataset: Dataset,
    /// Shared source of every file, or `unknown` when they disagree.
    pub source: String,
    pub metadata: BatchMetadata,
}

pub fn load_file(path: &Path, config: &AnalysisConfig, options: &LoadOptions) -> Result<LoadedFile> {
    let file_size_mb = check_input(path)?;
    let file_name = display_name(path);
    info!("Loading file: {file_name} ({file_size_mb:.2} MB)");
    if file_size_mb > RECOMMENDED_MAX_MB {
        warn!(
            "File size ({file_size_mb:.2} MB) exceeds recommended {RECOMMENDED_MAX_MB:.0}MB limit"
        );
    }

    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
    let table = io_utils::read_table(path, delimiter, options.encoding)
        .with_context(|| format!("Reading {path:?}"))?;
    let raw_columns = table.headers.clone();
    let normalized = normalize::normalize(table, &config.registry, &config.policy)
        .with_context(|| format!("Normalizing {path:?}"))?;

    let dataset = normalized
        .dataset
        .with_constant_column(SOURCE_FILE_COLUMN, &file_name)
        .with_constant_column(SOURCE_SYSTEM_COLUMN, &normalized.source);

    info!(
        "Loaded {} rows from {} source",
        dataset.len(),
        normalized.source
    );

    let metadata = FileMetadata {
        file_name,
        file_size_mb: round_to(file_size_mb, 2),
        row_count: dataset.len(),
        column_count: raw_columns.len(),
        columns: raw_columns,
        detected_source: normalized.source.clone(),
        detection: normalized.detection,
    };
    Ok(LoadedFile {
        dataset,
        source: normalized.source,
        metadata,
    })
}

/// Loads each file, normalizing it against its own detected source, then
/// stacks the results into one dataset.
pub fn load_files(
    paths: &[PathBuf],
    config: &AnalysisConfig,
    options: &LoadOptions,
) -> Result<LoadedBatch> {
    if paths.is_empty() {
        bail!("No input files specified");
    }
    let mut parts = Vec::with_capacity(paths.len());
    let mut files = Vec::with_capacity(paths.len());
    let mut sources: Vec<String> = Vec::new();
    for path in paths {
        let loaded = load_file(path, config, options)?;
        if !sources.contains(&loaded.source) {
            sources.push(loaded.source.clone());
        }
        parts.push(loaded.dataset);
        files.push(loaded.metadata);
    }

    let dataset = Dataset::concat(parts);
    let source = match sources.as_slice() {
        [only] => only.clone(),
        _ => UNKNOWN_SOURCE.to_string(),
    };
    let metadata = BatchMetadata {
        total_rows: dataset.len(),
        total_files: files.len(),
        files,
    };
    Ok(LoadedBatch {
        dataset,
        source,
        metadata,
    })
}

fn check_input(path: &Path) -> Result<f64> {
    if io_utils::is_dash(path) {
        return Ok(0.0);
    }
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        bail!("Unsupported file format: .{extension}");
    }
    let bytes = path
        .metadata()
        .with_context(|| format!("Reading metadata for {path:?}"))?
        .len();
    Ok(bytes as f64 / (1024.0 * 1024.0))
}

fn display_name(path: &Path) -> String {
    if io_utils::is_dash(path) {
        return "stdin".to_string();
    }
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
