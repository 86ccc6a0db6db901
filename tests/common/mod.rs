#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};
use incident_insights::dataset::Dataset;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn dataset(columns: &[&str], rows: &[Vec<&str>]) -> Dataset {
    Dataset::from_rows(columns, rows).expect("valid literal dataset")
}

pub fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date") + Duration::days(offset)
}

/// `id,created_time` rows with `counts[i]` incidents on day `i`, each at
/// 10:00.
pub fn daily_series_csv(counts: &[usize]) -> String {
    let mut out = String::from("id,created_time\n");
    let mut id = 0usize;
    for (offset, count) in counts.iter().enumerate() {
        for _ in 0..*count {
            id += 1;
            out.push_str(&format!("INC{id},{} 10:00:00\n", day(offset as i64)));
        }
    }
    out
}

/// Same shape as [`daily_series_csv`], built directly as a dataset.
pub fn daily_series(counts: &[usize]) -> Dataset {
    let mut rows = Vec::new();
    let mut id = 0usize;
    for (offset, count) in counts.iter().enumerate() {
        for _ in 0..*count {
            id += 1;
            rows.push(vec![
                Some(format!("INC{id}")),
                Some(format!("{} 10:00:00", day(offset as i64))),
            ]);
        }
    }
    Dataset::new(vec!["id".into(), "created_time".into()], rows).expect("valid series")
}
