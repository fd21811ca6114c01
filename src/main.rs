//! Pipeline driver: option parsing, logging and run sequencing live here;
//! all algorithmic work is in the library.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use nbudget::config::Params;
use nbudget::engine::Engine;
use nbudget::model;

#[derive(Parser, Debug)]
#[command(name = "nbudget")]
#[command(about = "Spatial nitrogen mass balance", version)]
struct Args {
    /// Run parameters (JSON)
    #[arg(short, long)]
    params: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let params = Params::from_file(&args.params)
        .with_context(|| format!("loading {}", args.params.display()))?;
    info!(
        year = params.year,
        output_dir = %params.output_dir.display(),
        compress = params.compress,
        inputs = params.inputs.len(),
        "starting nitrogen budget run"
    );

    let graph = model::nitrogen_budget().context("building the derivation graph")?;
    info!(
        derivations = graph.node_count(),
        artifacts = graph.persisted_names().len(),
        "derivation graph ready"
    );

    let started = Instant::now();
    let summary = Engine::new(&graph, &params)
        .run()
        .context("nitrogen budget run failed")?;
    info!(
        cells = summary.cells,
        nodes = summary.nodes_evaluated,
        artifacts = summary.artifacts_written,
        elapsed_s = started.elapsed().as_secs_f64(),
        "run complete"
    );
    Ok(())
}
