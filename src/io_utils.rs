//! CSV reading, delimiter resolution and input decoding.
//!
//! All file input flows through this module:
//!
//! - **Delimiter resolution**: `.tsv` → tab, everything else → comma, with a
//!   manual override.
//! - **Encoding**: input is decoded via `encoding_rs`, defaulting to UTF-8.
//! - **stdin**: the `-` path convention reads standard input.
//! - **Table assembly**: [`read_table()`] yields a [`RawTable`] with empty
//!   fields already turned into missing cells.

use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

use crate::dataset::RawTable;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding)
}

/// Reads a whole delimited file into memory.
///
/// Short rows are padded with missing cells and long rows truncated to the
/// header width; blank and repeated header names get synthetic, unique names.
pub fn read_table(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<RawTable> {
    let mut reader = open_csv_reader_from_path(path, delimiter)?;
    let headers = unique_headers(reader_headers(&mut reader, encoding)?);
    let width = headers.len();

    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        // A quoted empty field is still a record.
        if record.is_empty() {
            continue;
        }
        let decoded = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", row_idx + 2))?;
        let mut row = decoded
            .into_iter()
            .take(width)
            .map(|cell| (!cell.is_empty()).then_some(cell))
            .collect::<Vec<_>>();
        row.resize(width, None);
        rows.push(row);
    }
    Ok(RawTable::new(headers, rows))
}

fn unique_headers(headers: Vec<String>) -> Vec<String> {
    let mut used = HashSet::with_capacity(headers.len());
    headers
        .into_iter()
        .enumerate()
        .map(|(idx, header)| {
            let trimmed = header.trim();
            let base = if trimmed.is_empty() {
                format!("field_{idx}")
            } else {
                trimmed.to_string()
            };
            let mut name = base.clone();
            let mut suffix = 2usize;
            while used.contains(&name) {
                name = format!("{base}_{suffix}");
                suffix += 1;
            }
            used.insert(name.clone());
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unique_headers_fills_blanks_and_suffixes_repeats() {
        let headers = unique_headers(vec![
            "id".into(),
            " ".into(),
            "id".into(),
            "title".into(),
        ]);
        assert_eq!(headers, vec!["id", "field_1", "id_2", "title"]);
    }

    #[test]
    fn unique_headers_skip_suffixes_already_in_use() {
        let headers = unique_headers(vec!["id".into(), "id".into(), "id_2".into(), "id".into()]);
        assert_eq!(headers, vec!["id", "id_2", "id_2_2", "id_3"]);
    }

    #[test]
    fn read_table_keeps_quoted_empty_single_field_rows() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("notes.csv");
        let mut file = File::create(&path).expect("create csv");
        writeln!(file, "note").unwrap();
        writeln!(file, "first").unwrap();
        writeln!(file, "\"\"").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "last").unwrap();
        drop(file);

        let table = read_table(&path, b',', UTF_8).expect("read table");
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.rows[1], vec![None]);
        assert_eq!(table.rows[2], vec![Some("last".to_string())]);
    }

    #[test]
    fn read_table_pads_short_rows_and_maps_empty_to_missing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("alerts.csv");
        let mut file = File::create(&path).expect("create csv");
        writeln!(file, "id,title,severity").unwrap();
        writeln!(file, "1,Disk full,high").unwrap();
        writeln!(file, "2,,").unwrap();
        writeln!(file, "3").unwrap();
        drop(file);

        let table = read_table(&path, b',', UTF_8).expect("read table");
        assert_eq!(table.headers, vec!["id", "title", "severity"]);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.rows[1], vec![Some("2".to_string()), None, None]);
        assert_eq!(table.rows[2], vec![Some("3".to_string()), None, None]);
    }

    #[test]
    fn delimiter_follows_extension() {
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), Some(b';')), b';');
    }
}
