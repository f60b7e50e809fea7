//! segraph-scheduler: tiled, multi-worker driver for region-adjacency
//! graph segmentation.
//!
//! A run reads one raster, splits it into tiles sized to the memory
//! budget, segments and contracts every tile on worker threads, stitches
//! the tile graphs into one region graph and persists the results:
//!
//! 1. [`SchedulerConfig::validate`], then the output directory and input
//!    raster are checked. Nothing is written if any of these fail.
//! 2. [`TilePlan`] sizes tiles against half the budget, split between
//!    the workers.
//! 3. [`run_tiles`] processes tiles; finished tile graphs go to a
//!    [`TileStore`] that spills to scratch past the other half.
//! 4. [`stitch`] exchanges the regions on tile edges, contracts them up
//!    to `max_iterations` passes and assembles the final graph.
//! 5. [`persist`] writes the label image, graph file and vector file.

pub mod config;
pub mod error;
pub mod raster;
pub mod report;
pub mod segment;
pub mod spill;
pub mod stitch;
pub mod tiling;
pub mod worker;

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use segraph_export::{VectorOptions, to_geojson};
use segraph_graph::{Clock, Dimensions, LabelGraph, write_graph};

pub use config::{MeanShiftParams, OutputConfig, SchedulerConfig};
pub use error::SchedulerError;
pub use raster::{
    RegionIndexImage, read_raster, read_region_index_image, region_index_image,
    write_region_index_image,
};
pub use report::{RunReport, StdClock, TileReport};
pub use segment::{PrelabelledSegmenter, Segmenter};
pub use spill::TileStore;
pub use stitch::{StitchOutcome, stitch};
pub use tiling::{Tile, TilePlan};
pub use worker::{TileJob, TileMessage, process_tile, run_tiles};

/// Run with the [`PrelabelledSegmenter`].
///
/// # Errors
///
/// See [`run_with`].
pub fn run(config: &SchedulerConfig) -> Result<RunReport, SchedulerError> {
    run_with(config, &PrelabelledSegmenter)
}

/// Run the full pipeline with `segmenter`.
///
/// # Errors
///
/// Any [`SchedulerError`]; all are fatal. Configuration, output
/// directory and input raster errors are reported before any file is
/// written.
pub fn run_with<S: Segmenter>(
    config: &SchedulerConfig,
    segmenter: &S,
) -> Result<RunReport, SchedulerError> {
    let clock = StdClock;
    let start = clock.now();

    config.validate()?;
    check_directory(&config.output.directory)?;
    let raster = read_raster(&config.input)?;
    let dimensions = Dimensions {
        width: raster.width(),
        height: raster.height(),
    };

    let budget = config.memory_budget_bytes();
    let tile_budget = budget / 2 / config.workers as u64;
    let plan = TilePlan::new(
        dimensions,
        config.tile_width,
        config.tile_height,
        tile_budget,
        config.connectivity,
    )?;
    info!(
        "{}x{} raster in {} tiles of {}x{}",
        dimensions.width,
        dimensions.height,
        plan.len(),
        plan.tile_size().0,
        plan.tile_size().1,
    );

    let scratch = config
        .scratch_dir
        .join(format!("segraph-{}", std::process::id()));
    let mut store = TileStore::new(budget / 2, scratch);
    let mut tiles = Vec::with_capacity(plan.len());
    let job = TileJob {
        raster: &raster,
        segmenter,
        params: &config.mean_shift,
        connectivity: config.connectivity,
        clock: &clock,
    };
    run_tiles(&job, &plan, config.workers, |message| {
        let payload_bytes = message.payload.len() as u64;
        let spilled = store.insert(message.tile, message.payload)?;
        tiles.push(TileReport {
            tile: message.tile,
            worker: message.worker,
            regions: message.nodes,
            payload_bytes,
            memory_bytes: message.memory_size,
            spilled,
            passes: message.diagnostics.iterations.len(),
            duration: message.diagnostics.total_duration,
        });
        Ok(())
    })?;
    tiles.sort_by_key(|t| (t.tile.row, t.tile.col));
    drop(raster);

    let stitched = stitch(
        &plan,
        &store,
        config.connectivity,
        config.max_iterations,
        budget.saturating_sub(store.resident_bytes()),
        &clock,
    )?;
    store.cleanup();

    let outputs = persist(&stitched.graph, dimensions, &config.output)?;
    let report = RunReport {
        raster: dimensions,
        tile_size: plan.tile_size(),
        workers: config.workers,
        tiles,
        tile_regions: stitched.tile_regions,
        border_regions: stitched.border_regions,
        cross_tile_pairs: stitched.cross_tile_pairs,
        regions: stitched.graph.live_count(),
        edges: stitched.graph.edge_count(),
        stitch: stitched.diagnostics,
        outputs,
        total_duration: clock.elapsed(&start),
    };
    info!(
        "done: {} regions, {} edges in {:.3}s",
        report.regions,
        report.edges,
        report.total_duration.as_secs_f64()
    );
    Ok(report)
}

/// Write the artifacts selected by `output` and return their paths.
///
/// Every artifact is encoded before the first file is written, so an
/// encoding failure leaves the directory untouched.
///
/// # Errors
///
/// [`SchedulerError::TooManyRegions`] / [`SchedulerError::Export`] /
/// [`SchedulerError::Codec`] from encoding, [`SchedulerError::Io`] and
/// [`SchedulerError::ImageEncode`] from writing.
pub fn persist(
    graph: &LabelGraph,
    dimensions: Dimensions,
    output: &OutputConfig,
) -> Result<Vec<PathBuf>, SchedulerError> {
    let label_image = if output.write_label_image {
        Some(region_index_image(graph, dimensions)?)
    } else {
        None
    };
    let graph_bytes = if output.write_graph {
        Some(write_graph(graph)?)
    } else {
        None
    };
    let vector = match &output.vector_name {
        Some(name) => {
            let options = VectorOptions {
                field_name: output.field_name.clone(),
                use_8_connected: output.use_8_connected,
            };
            Some((name, to_geojson(graph, dimensions, &options)?))
        }
        None => None,
    };

    let mut written = Vec::new();
    if let Some(image) = label_image {
        let path = output.directory.join(&output.label_image_name);
        write_region_index_image(&image, &path)?;
        written.push(path);
    }
    if let Some(bytes) = graph_bytes {
        let path = output.directory.join(&output.graph_name);
        fs::write(&path, bytes).map_err(|e| SchedulerError::io(&path, e))?;
        written.push(path);
    }
    if let Some((name, json)) = vector {
        let path = output.directory.join(name);
        fs::write(&path, json).map_err(|e| SchedulerError::io(&path, e))?;
        written.push(path);
    }
    for path in &written {
        info!("wrote {}", path.display());
    }
    Ok(written)
}

fn check_directory(path: &Path) -> Result<(), SchedulerError> {
    let metadata = fs::metadata(path).map_err(|e| SchedulerError::io(path, e))?;
    if metadata.is_dir() {
        Ok(())
    } else {
        Err(SchedulerError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
        ))
    }
}
