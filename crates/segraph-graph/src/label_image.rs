//! Label image to region-adjacency graph.
//!
//! Construction runs in three phases, each a distinct type:
//!
//! ```rust
//! # use segraph_graph::{Connectivity, GraphError, LabelImage, LabelImageToGraph};
//! # fn run(image: &LabelImage) -> Result<(), GraphError> {
//! let graph = LabelImageToGraph::new(image, Connectivity::Four)
//!     .init_output()?      // one node per pixel
//!     .build_output()?;    // contract to one node per region
//! # Ok(())
//! # }
//! ```
//!
//! Contraction is pairwise: every pass walks a snapshot of the live ids
//! in ascending order and merges each node with its first same-label
//! neighbor. The live count strictly decreases on every merge and is
//! bounded below by the number of connected same-label regions, so the
//! loop always reaches a fixpoint. The same [`Contracting`] stage also
//! drives contraction of graphs stitched together from several tiles.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::attribute::LabelNodeAttribute;
use crate::diagnostics::{Clock, ContractionDiagnostics, IterationDiagnostics, NoClock};
use crate::graph::Graph;
use crate::types::{Coord, Dimensions, GraphError, LabelImage, NodeId};

/// The graph type produced by contraction.
pub type LabelGraph = Graph<LabelNodeAttribute>;

/// Pixel neighborhood used to decide adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Edge-sharing neighbors only.
    #[default]
    Four,
    /// Edge- and corner-sharing neighbors.
    Eight,
}

impl Connectivity {
    /// Neighbor offsets `(dx, dy)` that come after a pixel in row-major
    /// order. Visiting only these from every pixel enumerates each
    /// adjacent pixel pair exactly once.
    #[must_use]
    pub const fn forward_offsets(self) -> &'static [(i64, i64)] {
        match self {
            Self::Four => &[(1, 0), (0, 1)],
            Self::Eight => &[(1, 0), (-1, 1), (0, 1), (1, 1)],
        }
    }
}

/// Maps pixels of an image onto linear coordinates of a larger raster.
///
/// A tile cropped out of a big raster is processed on its own, but its
/// nodes must carry coordinates of the full raster so tiles can be
/// stitched afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFrame {
    origin_x: u32,
    origin_y: u32,
    raster: Dimensions,
}

impl PixelFrame {
    /// The image is the whole raster.
    #[must_use]
    pub const fn whole(raster: Dimensions) -> Self {
        Self {
            origin_x: 0,
            origin_y: 0,
            raster,
        }
    }

    /// The image is a window of `raster` whose top-left pixel sits at
    /// `(origin_x, origin_y)`.
    #[must_use]
    pub const fn window(origin_x: u32, origin_y: u32, raster: Dimensions) -> Self {
        Self {
            origin_x,
            origin_y,
            raster,
        }
    }

    /// Linear raster coordinate of local pixel `(x, y)`.
    #[must_use]
    pub fn coord(self, x: u32, y: u32) -> Coord {
        self.raster.linear(self.origin_x + x, self.origin_y + y)
    }
}

/// Phase 0: input captured, nothing built yet.
#[must_use = "call .init_output() to build the per-pixel graph"]
pub struct LabelImageToGraph<'a> {
    image: &'a LabelImage,
    connectivity: Connectivity,
    frame: PixelFrame,
}

impl<'a> LabelImageToGraph<'a> {
    /// Prepare to convert `image` under `connectivity`.
    pub fn new(image: &'a LabelImage, connectivity: Connectivity) -> Self {
        let raster = Dimensions {
            width: image.width(),
            height: image.height(),
        };
        Self {
            image,
            connectivity,
            frame: PixelFrame::whole(raster),
        }
    }

    /// Emit pixel coordinates in `frame` instead of image-local ones.
    pub const fn with_frame(mut self, frame: PixelFrame) -> Self {
        self.frame = frame;
        self
    }

    /// Build the per-pixel graph.
    ///
    /// Pixels are scanned row-major; the pixel at `(x, y)` becomes node
    /// `y * width + x` with attribute `{label: value, pixels: [coord]}`
    /// and is connected to each of its neighbors under the configured
    /// connectivity.
    ///
    /// # Errors
    ///
    /// Only fails if the graph rejects an edge, which would indicate a
    /// bug in the scan.
    pub fn init_output(self) -> Result<Contracting, GraphError> {
        let (width, height) = self.image.dimensions();
        let w = width as usize;
        let pixel_count = w * height as usize;
        let mut graph = Graph::with_capacity(pixel_count);

        for (x, y, pixel) in self.image.enumerate_pixels() {
            graph.add_node(LabelNodeAttribute::single(pixel.0[0], self.frame.coord(x, y)));
        }

        let offsets = self.connectivity.forward_offsets();
        for y in 0..i64::from(height) {
            for x in 0..i64::from(width) {
                let here = node_at(x, y, w);
                for &(dx, dy) in offsets {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || nx >= i64::from(width) || ny >= i64::from(height) {
                        continue;
                    }
                    graph.add_edge(here, node_at(nx, ny, w))?;
                }
            }
        }

        debug!(
            "init_output: {width}x{height} -> {} nodes, {} edges ({:?})",
            graph.live_count(),
            graph.edge_count(),
            self.connectivity,
        );
        Ok(Contracting::from_graph(graph))
    }
}

/// Node id of in-bounds pixel `(x, y)` in the per-pixel graph.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
const fn node_at(x: i64, y: i64, width: usize) -> NodeId {
    NodeId::new(y as usize * width + x as usize)
}

/// Result of running the contraction loop.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// The contracted graph.
    pub graph: LabelGraph,
    /// Number of passes run, including the final no-merge pass.
    pub iterations: usize,
    /// `true` if the loop stopped at the fixpoint, `false` if it hit the
    /// iteration cap first.
    pub converged: bool,
}

/// Phases 1 and 2: a graph being contracted.
#[must_use = "call .build_output() to contract the graph"]
#[derive(Debug, Clone)]
pub struct Contracting {
    graph: LabelGraph,
    iterations: usize,
}

impl Contracting {
    /// Start contracting an existing graph, e.g. one stitched from tiles.
    pub const fn from_graph(graph: LabelGraph) -> Self {
        Self {
            graph,
            iterations: 0,
        }
    }

    /// The graph in its current state.
    #[must_use]
    pub const fn graph(&self) -> &LabelGraph {
        &self.graph
    }

    /// Passes run so far.
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Run one merge pass. Returns whether any merge happened.
    ///
    /// # Errors
    ///
    /// Propagates [`GraphError`]s from `merge_nodes`; any error means the
    /// contraction invariants are already broken.
    pub fn do_one_iteration(&mut self) -> Result<bool, GraphError> {
        Ok(self.merge_pass()? > 0)
    }

    /// Contract until the fixpoint and return the region graph.
    ///
    /// # Errors
    ///
    /// See [`do_one_iteration`](Self::do_one_iteration).
    pub fn build_output(self) -> Result<LabelGraph, GraphError> {
        Ok(self.build_output_bounded(None)?.graph)
    }

    /// Contract until the fixpoint or until `max_iterations` passes have
    /// run, whichever comes first.
    ///
    /// # Errors
    ///
    /// See [`do_one_iteration`](Self::do_one_iteration).
    pub fn build_output_bounded(
        self,
        max_iterations: Option<usize>,
    ) -> Result<BuildOutcome, GraphError> {
        Ok(self.build_output_with_diagnostics(max_iterations, &NoClock)?.0)
    }

    /// Like [`build_output_bounded`](Self::build_output_bounded), also
    /// recording per-pass diagnostics timed with `clock`.
    ///
    /// # Errors
    ///
    /// See [`do_one_iteration`](Self::do_one_iteration).
    pub fn build_output_with_diagnostics<C: Clock>(
        mut self,
        max_iterations: Option<usize>,
        clock: &C,
    ) -> Result<(BuildOutcome, ContractionDiagnostics), GraphError> {
        let start = clock.now();
        let initial_nodes = self.graph.live_count();
        let initial_edges = self.graph.edge_count();
        let mut passes = Vec::new();

        let converged = loop {
            if max_iterations.is_some_and(|cap| passes.len() >= cap) {
                break false;
            }
            let pass_start = clock.now();
            let merges = self.merge_pass()?;
            passes.push(IterationDiagnostics {
                merges,
                live_nodes: self.graph.live_count(),
                duration: clock.elapsed(&pass_start),
            });
            if merges == 0 {
                break true;
            }
        };

        let diagnostics = ContractionDiagnostics {
            initial_nodes,
            initial_edges,
            iterations: passes,
            final_nodes: self.graph.live_count(),
            final_edges: self.graph.edge_count(),
            converged,
            total_duration: clock.elapsed(&start),
        };
        let outcome = BuildOutcome {
            graph: self.graph,
            iterations: self.iterations,
            converged,
        };
        Ok((outcome, diagnostics))
    }

    fn merge_pass(&mut self) -> Result<usize, GraphError> {
        let mut merges = 0;
        for id in self.graph.live_ids() {
            // Absorbed earlier in this pass.
            if !self.graph.is_live(id) {
                continue;
            }
            if let Some(other) = get_adjacent_node_with_same_label(&self.graph, id)? {
                self.graph.merge_nodes(id, other)?;
                merges += 1;
            }
        }
        self.iterations += 1;
        debug!(
            "contraction pass {}: {merges} merges, {} live nodes",
            self.iterations,
            self.graph.live_count(),
        );
        Ok(merges)
    }
}

/// The lowest-id live neighbor of `id` carrying the same label, if any.
///
/// # Errors
///
/// Returns [`GraphError::UnknownNode`] / [`GraphError::Tombstoned`] if
/// `id` is not a live node.
pub fn get_adjacent_node_with_same_label(
    graph: &LabelGraph,
    id: NodeId,
) -> Result<Option<NodeId>, GraphError> {
    let node = graph.node(id)?;
    let label = node.attribute().label();
    Ok(node.neighbors().map(|(n, _)| n).find(|&n| {
        graph
            .get(n)
            .is_some_and(|neighbor| neighbor.attribute().label() == label)
    }))
}

/// Convert `image` into its region-adjacency graph in one call.
///
/// # Errors
///
/// See [`Contracting::do_one_iteration`].
pub fn label_image_to_graph(
    image: &LabelImage,
    connectivity: Connectivity,
) -> Result<LabelGraph, GraphError> {
    LabelImageToGraph::new(image, connectivity)
        .init_output()?
        .build_output()
}
