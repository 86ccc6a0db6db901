pub mod analyze;
pub mod cli;
pub mod config;
pub mod data;
pub mod dataset;
pub mod frequency;
pub mod io_utils;
pub mod loader;
pub mod normalize;
pub mod pipeline;
pub mod quality;
pub mod report;
pub mod suggest;
pub mod table;
pub mod trend;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    analyze::Stage,
    cli::{Cli, Commands, SourcesArgs},
    config::SourceRegistry,
    table::TextTable,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging(verbose: bool) {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            let level = if verbose {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            };
            builder.filter_module("incident_insights", level);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Analyze(args) => analyze::execute(&args),
        Commands::Info(args) => analyze::execute_info(&args),
        Commands::Quality(args) => analyze::execute_stage(&args, Stage::Quality),
        Commands::Trends(args) => analyze::execute_stage(&args, Stage::Trends),
        Commands::Sources(args) => handle_sources(&args),
    }
}

fn handle_sources(args: &SourcesArgs) -> Result<()> {
    let registry = match &args.config {
        Some(path) => SourceRegistry::load(path)
            .with_context(|| format!("Loading source registry from {path:?}"))?,
        None => SourceRegistry::default(),
    };
    if args.yaml {
        print!("{}", registry.to_yaml_string()?);
        return Ok(());
    }
    let mut table = TextTable::new(&["source", "signature", "mappings", "expected_fields"]);
    for source in &registry.sources {
        table.push_row([
            source.name.clone(),
            source.signature.join(", "),
            source.mappings.len().to_string(),
            source.expected_fields.join(", "),
        ]);
    }
    print!("{}", table.render());
    info!("Listed {} source(s)", registry.sources.len());
    Ok(())
}
