//! segraph: segment a raster into a region-adjacency graph, tile by tile.
//!
//! Reads the input raster, segments it in memory-budgeted tiles on worker
//! threads, stitches the tile graphs and writes the label image, the
//! graph file and optionally a GeoJSON vector file into the output
//! directory.
//!
//! # Usage
//!
//! ```text
//! segraph [OPTIONS] <INPUT> <TILE_WIDTH> <TILE_HEIGHT> <MEMORY_MB> <SCRATCH_DIR>
//!         <MAX_ITERATIONS> <SPATIAL_BANDWIDTH> <SPECTRAL_BANDWIDTH> <THRESHOLD>
//!         <SPECTRAL_RAMP> <MODE_SEARCH> <OUTPUT_DIR> <LABEL_IMAGE_NAME>
//! ```
//!
//! Missing arguments print usage to stderr and exit with status 1 without
//! touching the filesystem. Set `RUST_LOG=info` (or `debug`) for progress.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::debug;

use segraph_graph::Connectivity;
use segraph_scheduler::{MeanShiftParams, OutputConfig, SchedulerConfig};

/// Tiled region-adjacency graph segmentation.
///
/// Every positional argument is required.
#[derive(Parser)]
#[command(name = "segraph", version)]
struct Cli {
    /// Input raster (PNG, JPEG, BMP, WebP, TIFF).
    input: PathBuf,

    /// Maximum tile width in pixels.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    tile_width: u32,

    /// Maximum tile height in pixels.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    tile_height: u32,

    /// Memory budget in megabytes.
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    memory_mb: u64,

    /// Directory for spilled tile graphs.
    scratch_dir: PathBuf,

    /// Maximum contraction passes over the stitched graph.
    max_iterations: usize,

    /// Mean-shift spatial bandwidth in pixels.
    spatial_bandwidth: u32,

    /// Mean-shift spectral bandwidth.
    spectral_bandwidth: f32,

    /// Mean-shift convergence threshold.
    threshold: f32,

    /// Mean-shift spectral ramp.
    spectral_ramp: f32,

    /// Mode search: any value above 0 enables it.
    #[arg(allow_negative_numbers = true)]
    mode_search: i64,

    /// Output directory; must exist.
    output_dir: PathBuf,

    /// File name of the label image written into the output directory.
    label_image_name: String,

    /// Pixel adjacency.
    #[arg(long, value_enum, default_value_t = Adjacency::Four)]
    connectivity: Adjacency,

    /// Number of worker threads.
    #[arg(long, default_value_t = SchedulerConfig::DEFAULT_WORKERS, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    workers: usize,

    /// File name of the graph file.
    #[arg(long, default_value = OutputConfig::DEFAULT_GRAPH_NAME)]
    graph_name: String,

    /// Also write a GeoJSON file with this name.
    #[arg(long)]
    vector: Option<String>,

    /// Property carrying the region label in the GeoJSON file.
    #[arg(long, default_value = segraph_export::DEFAULT_FIELD_NAME)]
    field_name: String,

    /// Trace GeoJSON outlines 8-connected.
    #[arg(long)]
    vector_8_connected: bool,

    /// Skip the label image.
    #[arg(long)]
    no_label_image: bool,

    /// Skip the graph file.
    #[arg(long)]
    no_graph: bool,

    /// Print the run report as JSON instead of a human-readable summary.
    #[arg(long)]
    json: bool,
}

/// Pixel adjacency selection.
#[derive(Clone, Copy, ValueEnum)]
enum Adjacency {
    /// Edge-sharing neighbors.
    Four,
    /// Edge- and corner-sharing neighbors.
    Eight,
}

/// Build a [`SchedulerConfig`] from parsed arguments.
fn config_from_cli(cli: Cli) -> SchedulerConfig {
    SchedulerConfig {
        input: cli.input,
        tile_width: cli.tile_width,
        tile_height: cli.tile_height,
        memory_budget_mb: cli.memory_mb,
        scratch_dir: cli.scratch_dir,
        max_iterations: cli.max_iterations,
        mean_shift: MeanShiftParams {
            spatial_bandwidth: cli.spatial_bandwidth,
            spectral_bandwidth: cli.spectral_bandwidth,
            threshold: cli.threshold,
            spectral_ramp: cli.spectral_ramp,
            mode_search: cli.mode_search > 0,
        },
        connectivity: match cli.connectivity {
            Adjacency::Four => Connectivity::Four,
            Adjacency::Eight => Connectivity::Eight,
        },
        workers: cli.workers,
        output: OutputConfig {
            directory: cli.output_dir,
            label_image_name: cli.label_image_name,
            graph_name: cli.graph_name,
            vector_name: cli.vector,
            write_label_image: !cli.no_label_image,
            write_graph: !cli.no_graph,
            field_name: cli.field_name,
            use_8_connected: cli.vector_8_connected,
        },
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and succeed; every other
            // parse error goes to stderr with usage.
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let json = cli.json;
    let config = config_from_cli(cli);
    debug!("config: {config:#?}");

    let report = match segraph_scheduler::run(&config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error serializing report: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", report.summary());
    }
    ExitCode::SUCCESS
}
