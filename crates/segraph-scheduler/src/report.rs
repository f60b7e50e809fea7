//! Run report.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use segraph_graph::diagnostics::duration_serde;
use segraph_graph::{Clock, ContractionDiagnostics, Dimensions};

use crate::tiling::Tile;

/// Wall-clock [`Clock`] backed by [`Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Per-tile summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileReport {
    /// The tile.
    pub tile: Tile,
    /// Worker that processed it.
    pub worker: usize,
    /// Regions in the tile graph.
    pub regions: usize,
    /// Serialized size in bytes.
    pub payload_bytes: u64,
    /// In-memory size before serialization.
    pub memory_bytes: u64,
    /// Whether the tile was spilled to scratch.
    pub spilled: bool,
    /// Contraction passes run on the tile.
    pub passes: usize,
    /// Time spent contracting the tile (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Summary of one scheduler run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Raster size.
    pub raster: Dimensions,
    /// Nominal tile size `(width, height)` after budgeting.
    pub tile_size: (u32, u32),
    /// Worker threads used.
    pub workers: usize,
    /// Every tile, in row-major order.
    pub tiles: Vec<TileReport>,
    /// Regions across all tiles before stitching.
    pub tile_regions: usize,
    /// Tile regions on a tile edge, exchanged by the stitcher.
    pub border_regions: usize,
    /// Pixel pairs straddling a tile border.
    pub cross_tile_pairs: u64,
    /// Contraction of the stitched graph.
    pub stitch: ContractionDiagnostics,
    /// Regions in the final graph.
    pub regions: usize,
    /// Region adjacencies in the final graph.
    pub edges: usize,
    /// Files written.
    pub outputs: Vec<PathBuf>,
    /// Total run time (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl RunReport {
    /// Tiles that went to scratch.
    #[must_use]
    pub fn spilled_tiles(&self) -> usize {
        self.tiles.iter().filter(|t| t.spilled).count()
    }

    /// Human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Segmentation Report\n{}", "=".repeat(48)),
            format!(
                "Raster: {}x{}  |  Tiles: {} of {}x{}  |  Workers: {}",
                self.raster.width,
                self.raster.height,
                self.tiles.len(),
                self.tile_size.0,
                self.tile_size.1,
                self.workers,
            ),
            format!(
                "Tile regions: {} ({} on tile edges)  |  Spilled tiles: {}  |  Cross-tile pairs: {}",
                self.tile_regions,
                self.border_regions,
                self.spilled_tiles(),
                self.cross_tile_pairs,
            ),
            format!("Regions: {}  |  Edges: {}", self.regions, self.edges),
            format!(
                "Total duration: {:.3}ms",
                self.total_duration.as_secs_f64() * 1000.0
            ),
            String::new(),
            self.stitch.report(),
        ];
        if !self.outputs.is_empty() {
            lines.push(String::new());
            lines.push("Outputs:".to_owned());
            lines.extend(self.outputs.iter().map(|p| format!("  {}", p.display())));
        }
        lines.join("\n")
    }
}
