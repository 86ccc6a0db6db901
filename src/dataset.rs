//! In-memory incident table consumed by every analysis stage.
//!
//! A [`Dataset`] is built once (by the normalizer or the loader) and then only
//! read. Cells are `Option<String>`; `None` is the single representation of a
//! missing value. Timestamp columns parsed during normalization are cached
//! next to the raw cells so analyzers see the same parse results.

use std::{
    borrow::Cow,
    collections::{BTreeMap, HashSet},
    fmt,
};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::parse_timestamp;

pub const UNKNOWN_SOURCE: &str = "unknown";
pub const SOURCE_FILE_COLUMN: &str = "_source_file";
pub const SOURCE_SYSTEM_COLUMN: &str = "_source_system";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("Row {row} has {found} cell(s) but the dataset declares {expected} column(s)")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Column '{0}' appears more than once")]
    DuplicateColumn(String),
}

/// Fields of the standard post-normalization schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandardField {
    Id,
    Title,
    Category,
    Source,
    Severity,
    Status,
    CreatedTime,
    ResolvedTime,
    #[serde(rename = "_source_file")]
    SourceFile,
    #[serde(rename = "_source_system")]
    SourceSystem,
}

impl StandardField {
    pub const ALL: [StandardField; 10] = [
        StandardField::Id,
        StandardField::Title,
        StandardField::Category,
        StandardField::Source,
        StandardField::Severity,
        StandardField::Status,
        StandardField::CreatedTime,
        StandardField::ResolvedTime,
        StandardField::SourceFile,
        StandardField::SourceSystem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StandardField::Id => "id",
            StandardField::Title => "title",
            StandardField::Category => "category",
            StandardField::Source => "source",
            StandardField::Severity => "severity",
            StandardField::Status => "status",
            StandardField::CreatedTime => "created_time",
            StandardField::ResolvedTime => "resolved_time",
            StandardField::SourceFile => SOURCE_FILE_COLUMN,
            StandardField::SourceSystem => SOURCE_SYSTEM_COLUMN,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == name)
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(self, StandardField::CreatedTime | StandardField::ResolvedTime)
    }
}

impl fmt::Display for StandardField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance columns are added by the loader and never count as data.
pub fn is_provenance_column(name: &str) -> bool {
    name.starts_with('_')
}

/// Table as it came out of the file reader, before any renaming.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimestampColumn {
    pub values: Vec<Option<NaiveDateTime>>,
    /// Non-null cells that did not parse.
    pub unparseable: usize,
    pub unparseable_samples: Vec<String>,
}

impl TimestampColumn {
    const SAMPLE_LIMIT: usize = 5;

    pub fn parse<'a, I>(cells: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut values = Vec::new();
        let mut unparseable = 0usize;
        let mut unparseable_samples = Vec::new();
        for cell in cells {
            let parsed = cell.and_then(parse_timestamp);
            if let (Some(raw), None) = (cell, parsed) {
                unparseable += 1;
                if unparseable_samples.len() < Self::SAMPLE_LIMIT {
                    unparseable_samples.push(raw.to_string());
                }
            }
            values.push(parsed);
        }
        Self {
            values,
            unparseable,
            unparseable_samples,
        }
    }

    pub fn parsed_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_some()).count()
    }

    pub fn has_values(&self) -> bool {
        self.values.iter().any(Option::is_some)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
    timestamps: BTreeMap<String, TimestampColumn>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Result<Self, DatasetError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.clone()));
            }
        }
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DatasetError::RaggedRow {
                    row: idx,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self {
            columns,
            rows,
            timestamps: BTreeMap::new(),
        })
    }

    /// Convenience constructor for literal tables; empty strings become missing.
    pub fn from_rows<S: AsRef<str>>(columns: &[S], rows: &[Vec<&str>]) -> Result<Self, DatasetError> {
        let columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                    .collect()
            })
            .collect();
        Self::new(columns, rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Columns that carry incident data (provenance excluded).
    pub fn data_columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|name| !is_provenance_column(name))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[Option<String>]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = Option<&str>> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row[idx].as_deref()))
    }

    pub fn null_count(&self, name: &str) -> Option<usize> {
        self.column_values(name)
            .map(|values| values.filter(Option::is_none).count())
    }

    pub fn record(&self, index: usize) -> Option<Record<'_>> {
        (index < self.rows.len()).then_some(Record {
            dataset: self,
            index,
        })
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> + '_ {
        (0..self.rows.len()).map(move |index| Record {
            dataset: self,
            index,
        })
    }

    /// Parsed view of a column. Columns parsed during normalization come from
    /// the cache; anything else is parsed on demand.
    pub fn timestamp_column(&self, name: &str) -> Option<Cow<'_, TimestampColumn>> {
        if let Some(cached) = self.timestamps.get(name) {
            return Some(Cow::Borrowed(cached));
        }
        let values = self.column_values(name)?;
        Some(Cow::Owned(TimestampColumn::parse(values)))
    }

    pub fn parsed_timestamp_columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.timestamps.keys().map(String::as_str)
    }

    pub fn is_parsed_timestamp(&self, name: &str) -> bool {
        self.timestamps.contains_key(name)
    }

    pub(crate) fn with_parsed_timestamps(mut self, names: &[&str]) -> Self {
        for name in names {
            let parsed = self.column_values(name).map(TimestampColumn::parse);
            if let Some(parsed) = parsed {
                self.timestamps.insert((*name).to_string(), parsed);
            }
        }
        self
    }

    /// Appends (or overwrites) a column holding the same value on every row.
    pub fn with_constant_column(mut self, name: &str, value: &str) -> Self {
        match self.column_index(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = Some(value.to_string());
                }
            }
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(Some(value.to_string()));
                }
            }
        }
        self
    }

    /// Stacks datasets vertically. Columns are the union of all parts in
    /// first-seen order; cells a part does not have are missing.
    pub fn concat(parts: Vec<Dataset>) -> Dataset {
        let mut columns: Vec<String> = Vec::new();
        for part in &parts {
            for column in &part.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        let timestamp_names: Vec<String> = parts
            .iter()
            .flat_map(|part| part.timestamps.keys().cloned())
            .fold(Vec::new(), |mut acc, name| {
                if !acc.contains(&name) {
                    acc.push(name);
                }
                acc
            });

        let mut rows = Vec::with_capacity(parts.iter().map(Dataset::len).sum());
        for part in parts {
            let positions: Vec<Option<usize>> =
                columns.iter().map(|c| part.column_index(c)).collect();
            for row in part.rows {
                let mut row = row.into_iter().map(Some).collect::<Vec<_>>();
                rows.push(
                    positions
                        .iter()
                        .map(|pos| pos.and_then(|idx| row[idx].take()).flatten())
                        .collect(),
                );
            }
        }

        let combined = Dataset {
            columns,
            rows,
            timestamps: BTreeMap::new(),
        };
        let names = timestamp_names.iter().map(String::as_str).collect::<Vec<_>>();
        combined.with_parsed_timestamps(&names)
    }
}

/// Read-only view of one row through the standard schema.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    dataset: &'a Dataset,
    index: usize,
}

impl<'a> Record<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.dataset.column_index(column)?;
        self.dataset.rows[self.index][idx].as_deref()
    }

    pub fn field(&self, field: StandardField) -> Option<&'a str> {
        self.get(field.as_str())
    }

    pub fn id(&self) -> Option<&'a str> {
        self.field(StandardField::Id)
    }

    pub fn title(&self) -> Option<&'a str> {
        self.field(StandardField::Title)
    }

    pub fn severity(&self) -> Option<&'a str> {
        self.field(StandardField::Severity)
    }

    pub fn status(&self) -> Option<&'a str> {
        self.field(StandardField::Status)
    }

    pub fn created_time(&self) -> Option<NaiveDateTime> {
        self.timestamp(StandardField::CreatedTime)
    }

    pub fn resolved_time(&self) -> Option<NaiveDateTime> {
        self.timestamp(StandardField::ResolvedTime)
    }

    fn timestamp(&self, field: StandardField) -> Option<NaiveDateTime> {
        match self.dataset.timestamps.get(field.as_str()) {
            Some(column) => column.values.get(self.index).copied().flatten(),
            None => self.field(field).and_then(parse_timestamp),
        }
    }
}
