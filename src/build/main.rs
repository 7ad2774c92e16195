//! Offline index builder.
//!
//! Reads a GeoJSON boundary dataset, bulk-loads a spatial index over its
//! polygons and writes the index artifact consumed by the query server.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use baltic_pip::pip::{build_index, read_features_from_path, BuildOptions, SpatialTree};

#[derive(Parser, Debug)]
#[command(name = "build-index")]
#[command(about = "Build the Baltic containment index from a GeoJSON dataset")]
struct Args {
    /// GeoJSON FeatureCollection with Polygon/MultiPolygon features (.gz accepted)
    #[arg(short, long)]
    input: PathBuf,

    /// Output artifact path; a .gz suffix enables compression
    #[arg(short, long, default_value = "data/baltic-index.json.gz")]
    output: PathBuf,

    /// Maximum entries per index node
    #[arg(long, default_value_t = SpatialTree::DEFAULT_NODE_CAPACITY)]
    node_capacity: usize,

    /// Dataset label stored in the artifact (defaults to the input file name)
    #[arg(long)]
    source: Option<String>,
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Baltic index builder");
    info!("Input: {}", args.input.display());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    spinner.set_message("Reading dataset...");
    let features = read_features_from_path(&args.input)
        .with_context(|| format!("Failed to read dataset {}", args.input.display()))?;

    let source = args.source.clone().unwrap_or_else(|| {
        args.input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string()
    });
    let options = BuildOptions {
        node_capacity: args.node_capacity,
        source,
    };

    spinner.set_message(format!("Bulk-loading {} features...", features.len()));
    let (artifact, report) = build_index(features, &options);

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    spinner.set_message("Writing artifact...");
    artifact
        .save(&args.output)
        .context("Failed to write index artifact")?;
    spinner.finish_and_clear();

    info!(
        "Indexed {} features ({} skipped, {} suspect) into {}",
        report.indexed,
        report.skipped,
        report.suspect,
        args.output.display()
    );
    if report.indexed == 0 {
        warn!("The index is empty; every polygon query will answer false");
    }

    Ok(())
}
