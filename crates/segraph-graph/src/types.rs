//! Shared types for the segraph region-adjacency graph engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `ImageBuffer` and `Luma` so downstream crates can build
/// label rasters without depending on `image` directly.
pub use image::{ImageBuffer, Luma};

/// Region class id carried by every label node.
pub type Label = u32;

/// Linear pixel coordinate (`x + y * width` over the full raster).
pub type Coord = u64;

/// A single-band raster of region labels.
pub type LabelImage = ImageBuffer<Luma<Label>, Vec<Label>>;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels.
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Linear coordinate of `(x, y)` in row-major order.
    #[must_use]
    pub fn linear(self, x: u32, y: u32) -> Coord {
        u64::from(x) + u64::from(y) * u64::from(self.width)
    }

    /// Inverse of [`linear`](Self::linear).
    ///
    /// Returns `None` if `coord` lies outside the raster.
    #[must_use]
    pub fn position(self, coord: Coord) -> Option<(u32, u32)> {
        if self.width == 0 || coord >= self.pixel_count() {
            return None;
        }
        let width = u64::from(self.width);
        let x = u32::try_from(coord % width).ok()?;
        let y = u32::try_from(coord / width).ok()?;
        Some((x, y))
    }
}

/// Stable identifier of a node in a [`Graph`](crate::Graph).
///
/// Ids are arena slots: they are allocated in increasing order, never
/// reused, and stay valid (as tombstones) after the node is merged away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Wrap an arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The arena index this id refers to.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Graph contract violations.
///
/// Every variant means the caller (or the contraction algorithm) has
/// broken an invariant; the failing operation leaves the graph untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// An edge or merge would connect a node to itself.
    #[error("self-loop on node {0}")]
    SelfLoop(NodeId),

    /// The id was never allocated by this graph.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The id refers to a node that has been removed or merged away.
    #[error("node {0} is tombstoned")]
    Tombstoned(NodeId),

    /// Adjacency lists of the two nodes disagree.
    #[error("edge {0} -> {1} has no reverse edge")]
    AsymmetricEdge(NodeId, NodeId),

    /// A node lists the same neighbor more than once.
    #[error("duplicate edge between {0} and {1}")]
    DuplicateEdge(NodeId, NodeId),

    /// The same id was restored twice.
    #[error("node {0} defined more than once")]
    DuplicateNode(NodeId),

    /// A live node still references a tombstoned neighbor.
    #[error("node {0} references tombstoned neighbor {1}")]
    DanglingEdge(NodeId, NodeId),
}
