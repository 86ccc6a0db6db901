use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use incident_insights::config::AnalysisConfig;
use incident_insights::loader::{self, LoadOptions};
use incident_insights::pipeline;
use tempfile::TempDir;

fn generate_servicenow_export(rows: usize) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let csv_path = temp_dir.path().join("incidents.csv");
    let mut file = File::create(&csv_path).expect("create csv");
    writeln!(
        file,
        "number,sys_id,short_description,priority,state,category,assignment_group,cmdb_ci,sys_created_on,resolved_at"
    )
    .expect("header");
    for i in 0..rows {
        let priority = match i % 4 {
            0 => "1 - Critical",
            1 => "2 - High",
            2 => "3 - Moderate",
            _ => "4 - Low",
        };
        let state = if i % 5 == 0 { "In Progress" } else { "Resolved" };
        let category = match i % 3 {
            0 => "Software",
            1 => "Network",
            _ => "Database",
        };
        let day = (i % 28) + 1;
        let hour = i % 24;
        let resolved = if i % 5 == 0 {
            String::new()
        } else {
            format!("2024-02-{day:02} {:02}:30:00", (hour + 1) % 24)
        };
        writeln!(
            file,
            "INC{i:07},{i:x},Service degradation {i},{priority},{state},{category},Group {},ci-{},2024-02-{day:02} {hour:02}:00:00,{resolved}",
            i % 7,
            i % 40
        )
        .expect("row");
    }
    (temp_dir, csv_path)
}

fn bench_pipeline(c: &mut Criterion) {
    let (temp_dir, csv_path) = generate_servicenow_export(20_000);
    let config = AnalysisConfig::default();
    let loaded = loader::load_file(&csv_path, &config, &LoadOptions::default()).expect("load");

    let mut group = c.benchmark_group("analysis");

    group.bench_function("load_and_normalize", |b| {
        b.iter_batched(
            || (),
            |_| {
                loader::load_file(&csv_path, &config, &LoadOptions::default()).expect("load");
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("full_pipeline", |b| {
        b.iter(|| pipeline::analyze(&loaded.dataset, &loaded.source, &config));
    });

    drop(temp_dir);
    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
