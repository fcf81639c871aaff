use crate::{
    backend::{SqliteBackend, StoreBackend},
    config::{BenchConfig, OutputConfig},
    driver::{RunContext, RunError, RunPlan},
};
use duel_analysis::{fit_all, render_comparison, render_file_sizes, ReportError, Results, SizeTable};
use duel_ingest::Dataset;
use rand::Rng;
use std::{fs, io};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to write output: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to serialize results: {0}")]
    Serialize(#[from] serde_yaml::Error),
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Load `scale` rows, connect both backends and run every phase against them
pub fn run_scale<R: Rng + ?Sized>(
    config: &BenchConfig,
    scale: usize,
    rng: &mut R,
) -> Result<Results, RunError> {
    let plan = RunPlan::for_scale(scale);

    info!(
        scale = plan.scale,
        chunk_size = plan.chunk_size,
        range_tests = plan.range_tests,
        "Starting benchmark run"
    );

    // a broken source ends the run before any backend is touched
    let dataset = Dataset::load(&config.dataset.path, config.dataset.key_format, Some(scale))?;
    if dataset.len() < scale {
        warn!(
            scale = scale,
            rows = dataset.len(),
            "Dataset holds fewer rows than requested"
        );
    }

    let store = StoreBackend::connect(&config.store)?;
    let sqlite = SqliteBackend::open(config.sqlite.path_for(scale), &config.sqlite.table)?;

    Ok(RunContext::new(store, sqlite, &plan).run(&dataset, &plan, rng))
}

/// Write the result dump of a run and render its figure
pub fn publish(results: &Results, output: &OutputConfig) -> Result<(), PublishError> {
    fs::create_dir_all(&output.dir)?;

    let scale = results.meta.scale;
    let dump = output.results_path(scale);
    fs::write(&dump, serde_yaml::to_string(results)?)?;
    info!(path = %dump.display(), "Wrote results");

    let trends = fit_all(results);
    let figure = output.figure_path(scale);
    render_comparison(&figure, results, &trends)?;
    info!(path = %figure.display(), "Rendered metrics");

    Ok(())
}

pub fn publish_sizes(table: &SizeTable, output: &OutputConfig) -> Result<(), PublishError> {
    fs::create_dir_all(&output.dir)?;

    let figure = output.sizes_figure_path();
    render_file_sizes(&figure, table)?;
    info!(path = %figure.display(), "Rendered file sizes");

    Ok(())
}
