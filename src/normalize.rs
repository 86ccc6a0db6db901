//! Source detection and schema normalization.
//!
//! Detection scores every registry entry by how many of its signature columns
//! the raw table carries; exports routinely gain or lose optional columns, so
//! an exact header match is never required. Normalization then renames the
//! columns the detected source's table knows about and parses the standard
//! timestamp fields.

use std::collections::HashMap;

use log::{debug, warn};
use serde::Serialize;

use crate::{
    config::{Policy, SourceRegistry},
    data::normalize_column_name,
    dataset::{Dataset, DatasetError, RawTable, StandardField, UNKNOWN_SOURCE},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceScore {
    pub source: String,
    pub score: usize,
    pub signature_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub source: String,
    pub score: usize,
    pub matched_columns: Vec<String>,
    pub candidates: Vec<SourceScore>,
}

impl Detection {
    pub fn is_known(&self) -> bool {
        self.source != UNKNOWN_SOURCE
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub dataset: Dataset,
    pub source: String,
    pub detection: Detection,
}

pub fn detect_source<S: AsRef<str>>(
    columns: &[S],
    registry: &SourceRegistry,
    policy: &Policy,
) -> Detection {
    let present = columns
        .iter()
        .map(|c| normalize_column_name(c.as_ref()))
        .collect::<Vec<_>>();

    let mut candidates = Vec::with_capacity(registry.sources.len());
    let mut best: Option<(usize, usize)> = None;
    for (idx, profile) in registry.sources.iter().enumerate() {
        let score = profile
            .signature
            .iter()
            .filter(|column| present.contains(column))
            .count();
        candidates.push(SourceScore {
            source: profile.name.clone(),
            score,
            signature_len: profile.signature.len(),
        });
        if !passes_gate(score, profile.signature.len(), policy) {
            continue;
        }
        // Strictly greater keeps the earlier declaration on ties.
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((idx, score));
        }
    }

    match best {
        Some((idx, score)) => {
            let profile = &registry.sources[idx];
            let matched_columns = profile
                .signature
                .iter()
                .filter(|column| present.contains(column))
                .cloned()
                .collect();
            Detection {
                source: profile.name.clone(),
                score,
                matched_columns,
                candidates,
            }
        }
        None => Detection {
            source: UNKNOWN_SOURCE.to_string(),
            score: 0,
            matched_columns: Vec::new(),
            candidates,
        },
    }
}

fn passes_gate(score: usize, signature_len: usize, policy: &Policy) -> bool {
    if score == 0 {
        return false;
    }
    score >= policy.min_signature_matches
        || (signature_len <= policy.small_signature_len && score * 2 > signature_len)
}

/// Detects the source of `table` and maps it onto the standard schema.
///
/// Never drops rows. Fails only when the table itself is structurally invalid
/// (ragged rows, or headers that collide after renaming).
pub fn normalize(
    table: RawTable,
    registry: &SourceRegistry,
    policy: &Policy,
) -> Result<Normalized, DatasetError> {
    let detection = detect_source(&table.headers, registry, policy);
    let dataset = apply_mapping(table, &detection.source, registry)?;
    debug!(
        "Normalized {} row(s) as '{}' (score {})",
        dataset.len(),
        detection.source,
        detection.score
    );
    Ok(Normalized {
        dataset,
        source: detection.source.clone(),
        detection,
    })
}

/// Renames the columns `source`'s table covers and parses the standard
/// timestamp fields. Unknown sources pass through with their raw names.
pub fn apply_mapping(
    table: RawTable,
    source: &str,
    registry: &SourceRegistry,
) -> Result<Dataset, DatasetError> {
    let RawTable { headers, rows } = table;
    let headers = match registry.get(source) {
        Some(profile) => rename_headers(headers, &profile.mappings),
        None => headers,
    };
    let timestamp_fields = [StandardField::CreatedTime, StandardField::ResolvedTime]
        .map(|field| field.as_str());
    Ok(Dataset::new(headers, rows)?.with_parsed_timestamps(&timestamp_fields))
}

fn rename_headers(
    headers: Vec<String>,
    mappings: &std::collections::BTreeMap<String, String>,
) -> Vec<String> {
    let targets: Vec<Option<&String>> = headers
        .iter()
        .map(|header| mappings.get(&normalize_column_name(header)))
        .collect();

    let mut claimed: HashMap<String, usize> = HashMap::new();
    for (idx, header) in headers.iter().enumerate() {
        if targets[idx].is_none() {
            claimed.insert(header.clone(), idx);
        }
    }

    let mut renamed = Vec::with_capacity(headers.len());
    for (idx, header) in headers.iter().enumerate() {
        let Some(target) = targets[idx] else {
            renamed.push(header.clone());
            continue;
        };
        match claimed.get(target) {
            Some(owner) if *owner != idx => {
                warn!(
                    "Keeping column '{header}' as-is: '{target}' is already present in the export"
                );
                renamed.push(header.clone());
            }
            _ => {
                claimed.insert(target.clone(), idx);
                renamed.push(target.clone());
            }
        }
    }
    renamed
}
