//! Worker threads: segment a tile, contract it, serialize the result.
//!
//! Tiles are dealt round-robin to a fixed number of scoped threads. Each
//! finished tile travels back to the calling thread over a channel as a
//! [`TileMessage`] holding the serialized tile graph; the caller decides
//! whether to keep it in memory or spill it to disk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use image::imageops;
use log::{debug, info};

use segraph_graph::{
    Clock, Connectivity, ContractionDiagnostics, Dimensions, LabelImage, LabelImageToGraph,
    PixelFrame, write_graph,
};

use crate::config::MeanShiftParams;
use crate::error::SchedulerError;
use crate::segment::Segmenter;
use crate::tiling::{Tile, TilePlan};

/// A contracted tile graph, ready for the stitcher.
#[derive(Debug, Clone)]
pub struct TileMessage {
    /// Which tile.
    pub tile: Tile,
    /// Index of the worker that produced it.
    pub worker: usize,
    /// The tile graph in graph-file encoding.
    pub payload: Vec<u8>,
    /// In-memory size of the tile graph before serialization.
    pub memory_size: u64,
    /// Regions in the tile.
    pub nodes: usize,
    /// Contraction diagnostics of the tile.
    pub diagnostics: ContractionDiagnostics,
}

/// Everything a worker needs that is shared by all tiles.
#[derive(Clone, Copy)]
pub struct TileJob<'a, S, C> {
    /// The full source raster.
    pub raster: &'a LabelImage,
    /// Labels each tile.
    pub segmenter: &'a S,
    /// Kernel parameters passed to the segmenter.
    pub params: &'a MeanShiftParams,
    /// Pixel adjacency.
    pub connectivity: Connectivity,
    /// Times the contraction passes.
    pub clock: &'a C,
}

/// Segment and contract one tile.
///
/// The tile is contracted to its fixpoint; node pixels carry
/// coordinates of the full raster.
///
/// # Errors
///
/// Propagates segmenter, graph and codec errors unwrapped; callers add
/// the tile position.
pub fn process_tile<S: Segmenter, C: Clock>(
    job: &TileJob<'_, S, C>,
    tile: Tile,
    worker: usize,
) -> Result<TileMessage, SchedulerError> {
    let crop = imageops::crop_imm(job.raster, tile.x, tile.y, tile.width, tile.height).to_image();
    let labels = job.segmenter.segment(crop, job.params)?;
    if labels.dimensions() != (tile.width, tile.height) {
        return Err(SchedulerError::SegmentedTileMismatch {
            expected: (tile.width, tile.height),
            found: labels.dimensions(),
        });
    }

    let raster = Dimensions {
        width: job.raster.width(),
        height: job.raster.height(),
    };
    let (outcome, diagnostics) = LabelImageToGraph::new(&labels, job.connectivity)
        .with_frame(PixelFrame::window(tile.x, tile.y, raster))
        .init_output()?
        .build_output_with_diagnostics(None, job.clock)?;

    let graph = outcome.graph;
    let payload = write_graph(&graph)?;
    debug!(
        "worker {worker}: tile ({}, {}) {}x{} -> {} regions, {} bytes",
        tile.row,
        tile.col,
        tile.width,
        tile.height,
        graph.live_count(),
        payload.len(),
    );
    Ok(TileMessage {
        tile,
        worker,
        payload,
        memory_size: graph.memory_size(),
        nodes: graph.live_count(),
        diagnostics,
    })
}

/// Process every tile of `plan` on `workers` threads, handing each
/// result to `sink` on the calling thread as it arrives.
///
/// The first failure, from a worker or from `sink`, stops the run:
/// workers start no further tile, results already in flight are drained
/// and dropped, and the error is returned once all workers have exited.
///
/// # Errors
///
/// Tile failures come back as [`SchedulerError::Tile`]; a panicking
/// worker as [`SchedulerError::WorkerPanicked`]; `sink` errors as-is.
pub fn run_tiles<S, C, F>(
    job: &TileJob<'_, S, C>,
    plan: &TilePlan,
    workers: usize,
    mut sink: F,
) -> Result<(), SchedulerError>
where
    S: Segmenter,
    C: Clock + Sync,
    F: FnMut(TileMessage) -> Result<(), SchedulerError>,
{
    let workers = workers.clamp(1, plan.len().max(1));
    info!(
        "processing {} tiles on {workers} worker(s) with segmenter {}",
        plan.len(),
        job.segmenter.name(),
    );

    let stop = AtomicBool::new(false);
    thread::scope(|scope| {
        let (sender, receiver) = mpsc::channel::<Result<TileMessage, SchedulerError>>();
        let stop = &stop;
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let sender = sender.clone();
                scope.spawn(move || {
                    for tile in plan.tiles().skip(worker).step_by(workers) {
                        if stop.load(Ordering::Acquire) {
                            break;
                        }
                        let result = process_tile(job, tile, worker).map_err(|e| SchedulerError::Tile {
                            row: tile.row,
                            col: tile.col,
                            source: Box::new(e),
                        });
                        if result.is_err() {
                            stop.store(true, Ordering::Release);
                        }
                        // Receiver gone means the run was abandoned.
                        if sender.send(result).is_err() || stop.load(Ordering::Acquire) {
                            break;
                        }
                    }
                })
            })
            .collect();
        drop(sender);

        let mut first_error = None;
        for result in receiver {
            if first_error.is_some() {
                continue;
            }
            if let Err(e) = result.and_then(&mut sink) {
                stop.store(true, Ordering::Release);
                first_error = Some(e);
            }
        }

        for (worker, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() && first_error.is_none() {
                first_error = Some(SchedulerError::WorkerPanicked(worker));
            }
        }
        first_error.map_or(Ok(()), Err)
    })
}
