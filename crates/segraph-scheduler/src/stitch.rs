//! Join tile graphs into one region graph.
//!
//! Only regions touching a tile edge can change after tile contraction,
//! so only those are exchanged. They are copied into an exchange graph
//! with their intra-tile edges and indexed by their border pixels; each
//! adjacent pixel pair that straddles two tiles then adds one unit of
//! boundary between the two regions holding them, and the exchange graph
//! is contracted so same-label regions split by a tile border become one
//! node. Interior regions stay in the [`TileStore`] until the final graph
//! is assembled tile by tile.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use segraph_graph::{
    BuildOutcome, Clock, Connectivity, ContractionDiagnostics, Contracting, Coord, Dimensions,
    LabelGraph, LabelNodeAttribute, NodeId,
};

use crate::error::SchedulerError;
use crate::spill::TileStore;
use crate::tiling::{Tile, TilePlan};

/// Estimated bytes per entry of the border pixel index.
const BORDER_ENTRY_BYTES: u64 = 48;

/// What the stitcher produced.
#[derive(Debug, Clone)]
pub struct StitchOutcome {
    /// The contracted raster-wide graph.
    pub graph: LabelGraph,
    /// Regions across all tiles before the stitch contraction.
    pub tile_regions: usize,
    /// Tile regions touching a tile edge, the ones exchanged.
    pub border_regions: usize,
    /// Pixel pairs that straddle a tile border.
    pub cross_tile_pairs: u64,
    /// Diagnostics of the stitch contraction.
    pub diagnostics: ContractionDiagnostics,
}

/// Stitch every tile of `plan` held in `store`.
///
/// The exchange graph and its border index must fit in `budget` bytes.
/// At most `max_iterations` contraction passes run over it; when the cap
/// is hit a warning is logged and the partially contracted graph is
/// returned.
///
/// # Errors
///
/// Returns [`SchedulerError::Tile`] if a tile is missing or cannot be
/// loaded, [`SchedulerError::PixelOutOfRaster`] if a tile graph holds a
/// foreign pixel, [`SchedulerError::StitchOverBudget`] if the exchanged
/// regions outgrow `budget`, and [`SchedulerError::Graph`] on
/// contraction failure.
pub fn stitch<C: Clock>(
    plan: &TilePlan,
    store: &TileStore,
    connectivity: Connectivity,
    max_iterations: usize,
    budget: u64,
    clock: &C,
) -> Result<StitchOutcome, SchedulerError> {
    let raster = plan.raster();
    let mut exchange = LabelGraph::new();
    let mut border: BTreeMap<Coord, NodeId> = BTreeMap::new();
    let mut tile_regions = 0;

    for tile in plan.tiles() {
        let local = load_tile(store, tile)?;
        tile_regions += local.live_count();

        let mut ids = vec![None; local.id_capacity()];
        for node in local.nodes() {
            let pixels = border_pixels(tile, raster, node.attribute()).map_err(|e| wrap(tile, e))?;
            if pixels.is_empty() {
                continue;
            }
            let id = exchange.add_node(node.attribute().clone());
            ids[node.id().index()] = Some(id);
            for coord in pixels {
                border.insert(coord, id);
            }
        }
        for node in local.nodes() {
            for (neighbor, edge) in node.neighbors() {
                if neighbor <= node.id() {
                    continue;
                }
                if let (Some(a), Some(b)) = (ids[node.id().index()], ids[neighbor.index()]) {
                    exchange.add_boundary(a, b, edge.boundary())?;
                }
            }
        }

        let needed = exchange.memory_size() + border.len() as u64 * BORDER_ENTRY_BYTES;
        if needed > budget {
            return Err(SchedulerError::StitchOverBudget { needed, budget });
        }
        debug!(
            "stitch: tile ({}, {}) exchanged {} of {} regions",
            tile.row,
            tile.col,
            ids.iter().flatten().count(),
            local.live_count()
        );
    }

    let border_regions = exchange.live_count();
    let mut cross_tile_pairs = 0_u64;
    for (&coord, &here) in &border {
        let Some((x, y)) = raster.position(coord) else {
            continue;
        };
        let Some(home) = plan.tile_at(x, y) else {
            continue;
        };
        for &(dx, dy) in connectivity.forward_offsets() {
            let (nx, ny) = (i64::from(x) + dx, i64::from(y) + dy);
            let (Ok(nx), Ok(ny)) = (u32::try_from(nx), u32::try_from(ny)) else {
                continue;
            };
            if nx >= raster.width || ny >= raster.height || home.contains(nx, ny) {
                continue;
            }
            let Some(&there) = border.get(&raster.linear(nx, ny)) else {
                continue;
            };
            cross_tile_pairs += 1;
            exchange.add_boundary(here, there, 1)?;
        }
    }
    info!(
        "stitch: {border_regions} of {tile_regions} tile regions exchanged, {cross_tile_pairs} cross-tile pixel pairs"
    );

    let (BuildOutcome { graph: merged, converged, .. }, diagnostics) =
        Contracting::from_graph(exchange).build_output_with_diagnostics(Some(max_iterations), clock)?;
    if !converged {
        warn!(
            "stitch contraction stopped at the cap of {max_iterations} passes with {} border regions left",
            merged.live_count()
        );
    }

    let graph = assemble(plan, store, merged, &border)?;
    Ok(StitchOutcome {
        graph,
        tile_regions,
        border_regions,
        cross_tile_pairs,
        diagnostics,
    })
}

/// Build the final graph: the merged border regions first, then each
/// tile's interior regions, reloaded one tile at a time.
fn assemble(
    plan: &TilePlan,
    store: &TileStore,
    mut merged: LabelGraph,
    border: &BTreeMap<Coord, NodeId>,
) -> Result<LabelGraph, SchedulerError> {
    // Exchanged region -> surviving merged region, via its border pixels.
    let mut survivor = vec![None; merged.id_capacity()];
    for node in merged.nodes() {
        for coord in node.attribute().pixels() {
            if let Some(&exchanged) = border.get(coord) {
                survivor[exchanged.index()] = Some(node.id());
            }
        }
    }

    let edges: Vec<(NodeId, NodeId, u32)> = merged
        .nodes()
        .flat_map(|node| {
            let id = node.id();
            node.neighbors()
                .filter(move |&(neighbor, _)| neighbor > id)
                .map(move |(neighbor, edge)| (id, neighbor, edge.boundary()))
        })
        .collect();

    let mut graph = LabelGraph::new();
    let mut placed = vec![None; merged.id_capacity()];
    for id in merged.live_ids() {
        placed[id.index()] = Some(graph.add_node(merged.remove_node(id)?));
    }
    for (a, b, boundary) in edges {
        if let (Some(a), Some(b)) = (placed[a.index()], placed[b.index()]) {
            graph.add_boundary(a, b, boundary)?;
        }
    }
    drop(merged);

    let raster = plan.raster();
    for tile in plan.tiles() {
        let mut local = load_tile(store, tile)?;
        let edges: Vec<(NodeId, NodeId, u32)> = local
            .nodes()
            .flat_map(|node| {
                let id = node.id();
                node.neighbors()
                    .filter(move |&(neighbor, _)| neighbor > id)
                    .map(move |(neighbor, edge)| (id, neighbor, edge.boundary()))
            })
            .collect();

        // (output id, exchanged) per local id.
        let mut ids: Vec<Option<(NodeId, bool)>> = vec![None; local.id_capacity()];
        for id in local.live_ids() {
            let first_border = border_pixels(tile, raster, local.node(id)?.attribute())
                .map_err(|e| wrap(tile, e))?
                .first()
                .copied();
            ids[id.index()] = match first_border {
                Some(coord) => {
                    let target = border
                        .get(&coord)
                        .and_then(|exchanged| survivor[exchanged.index()])
                        .and_then(|kept| placed[kept.index()])
                        .ok_or(SchedulerError::PixelOutOfRaster(coord))?;
                    Some((target, true))
                }
                None => Some((graph.add_node(local.remove_node(id)?), false)),
            };
        }
        for (a, b, boundary) in edges {
            let (Some((a, a_exchanged)), Some((b, b_exchanged))) = (ids[a.index()], ids[b.index()])
            else {
                continue;
            };
            // Edges between exchanged regions came through the merged graph.
            if a_exchanged && b_exchanged {
                continue;
            }
            graph.add_boundary(a, b, boundary)?;
        }
    }
    Ok(graph)
}

fn load_tile(store: &TileStore, tile: Tile) -> Result<LabelGraph, SchedulerError> {
    store
        .load(tile.row, tile.col)
        .map_err(|e| wrap(tile, e))?
        .ok_or_else(|| wrap(tile, SchedulerError::InvalidConfig("tile result missing".to_owned())))
}

/// Pixels of `attribute` on the edge of `tile`, checking that every
/// pixel lies inside the tile.
fn border_pixels(
    tile: Tile,
    raster: Dimensions,
    attribute: &LabelNodeAttribute,
) -> Result<Vec<Coord>, SchedulerError> {
    let mut out = Vec::new();
    for &coord in attribute.pixels() {
        let (x, y) = raster
            .position(coord)
            .ok_or(SchedulerError::PixelOutOfRaster(coord))?;
        if !tile.contains(x, y) {
            return Err(SchedulerError::PixelOutOfRaster(coord));
        }
        if tile.on_border(x, y) {
            out.push(coord);
        }
    }
    Ok(out)
}

fn wrap(tile: Tile, source: SchedulerError) -> SchedulerError {
    SchedulerError::Tile {
        row: tile.row,
        col: tile.col,
        source: Box::new(source),
    }
}
