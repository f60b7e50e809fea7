//! Tile partitioning under a memory budget.

use std::mem::size_of;

use serde::{Deserialize, Serialize};

use segraph_graph::{Connectivity, Dimensions, Edge, LabelNodeAttribute, NodeId};

use crate::error::SchedulerError;

/// One rectangular window of the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tile {
    /// Row in the tile grid.
    pub row: u32,
    /// Column in the tile grid.
    pub col: u32,
    /// Left pixel column.
    pub x: u32,
    /// Top pixel row.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Tile {
    /// Number of pixels covered.
    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Whether raster pixel `(x, y)` lies in this tile.
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x - self.x < self.width && y >= self.y && y - self.y < self.height
    }

    /// Whether raster pixel `(x, y)`, assumed inside, touches the tile edge.
    #[must_use]
    pub const fn on_border(&self, x: u32, y: u32) -> bool {
        x == self.x || y == self.y || x - self.x + 1 == self.width || y - self.y + 1 == self.height
    }
}

/// Row-major grid of equally sized tiles (the last row and column may be
/// smaller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePlan {
    raster: Dimensions,
    tile_width: u32,
    tile_height: u32,
    rows: u32,
    cols: u32,
}

impl TilePlan {
    /// Estimated bytes for one pixel of the per-pixel graph: its node
    /// attribute plus one adjacency entry per neighbor.
    #[must_use]
    pub const fn pixel_cost(connectivity: Connectivity) -> u64 {
        let neighbors = match connectivity {
            Connectivity::Four => 4,
            Connectivity::Eight => 8,
        };
        LabelNodeAttribute::single_pixel_memory_size()
            + neighbors * size_of::<(NodeId, Edge)>() as u64
    }

    /// Plan tiles of at most `max_width` x `max_height`, halving the
    /// longer side until one tile's per-pixel graph fits `budget` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::MemoryBudgetExceeded`] if even a 1x1 tile
    /// does not fit.
    pub fn new(
        raster: Dimensions,
        max_width: u32,
        max_height: u32,
        budget: u64,
        connectivity: Connectivity,
    ) -> Result<Self, SchedulerError> {
        let cost = Self::pixel_cost(connectivity);
        if cost > budget {
            return Err(SchedulerError::MemoryBudgetExceeded {
                needed: cost,
                budget,
            });
        }

        let mut width = max_width.min(raster.width).max(1);
        let mut height = max_height.min(raster.height).max(1);
        while u64::from(width) * u64::from(height) * cost > budget {
            if width >= height {
                width = width.div_ceil(2);
            } else {
                height = height.div_ceil(2);
            }
        }

        Ok(Self {
            raster,
            tile_width: width,
            tile_height: height,
            rows: raster.height.div_ceil(height),
            cols: raster.width.div_ceil(width),
        })
    }

    /// The raster being partitioned.
    #[must_use]
    pub const fn raster(&self) -> Dimensions {
        self.raster
    }

    /// Nominal tile size `(width, height)`.
    #[must_use]
    pub const fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    /// Grid size `(rows, cols)`.
    #[must_use]
    pub const fn grid(&self) -> (u32, u32) {
        (self.rows, self.cols)
    }

    /// Number of tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Whether the raster is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// The tile at grid position `(row, col)`.
    #[must_use]
    pub fn tile(&self, row: u32, col: u32) -> Option<Tile> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let x = col * self.tile_width;
        let y = row * self.tile_height;
        Some(Tile {
            row,
            col,
            x,
            y,
            width: self.tile_width.min(self.raster.width - x),
            height: self.tile_height.min(self.raster.height - y),
        })
    }

    /// The tile containing raster pixel `(x, y)`.
    #[must_use]
    pub fn tile_at(&self, x: u32, y: u32) -> Option<Tile> {
        self.tile(y / self.tile_height, x / self.tile_width)
    }

    /// All tiles in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).filter_map(move |col| self.tile(row, col)))
    }
}
