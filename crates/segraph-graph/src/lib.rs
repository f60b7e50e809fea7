//! segraph-graph: region-adjacency graph engine (sans-IO).
//!
//! Turns a label raster into a graph with one node per connected
//! same-label region and one edge per pair of touching regions:
//!
//! 1. [`LabelImageToGraph::init_output`] builds one node per pixel,
//!    connected to its 4- or 8-neighbors.
//! 2. [`Contracting::do_one_iteration`] merges every node with a
//!    same-label neighbor, repeatedly, until nothing changes.
//! 3. [`Contracting::build_output`] returns the contracted graph.
//!
//! The crate also defines the byte codec used to persist graphs and to
//! hand tile graphs between workers ([`write_graph`] / [`read_graph`]).
//! It has **no I/O dependencies**; reading rasters and writing files
//! lives in `segraph-scheduler`.

pub mod attribute;
pub mod codec;
pub mod diagnostics;
pub mod graph;
pub mod graph_file;
pub mod label_image;
pub mod types;

pub use attribute::{Attribute, AttributeKind, LabelNodeAttribute};
pub use codec::CodecError;
pub use diagnostics::{Clock, ContractionDiagnostics, IterationDiagnostics, NoClock};
pub use graph::{Edge, Graph, Node};
pub use graph_file::{read_graph, read_graph_bounded, write_graph};
pub use label_image::{
    BuildOutcome, Connectivity, Contracting, LabelGraph, LabelImageToGraph, PixelFrame,
    get_adjacent_node_with_same_label, label_image_to_graph,
};
pub use types::{Coord, Dimensions, GraphError, ImageBuffer, Label, LabelImage, Luma, NodeId};
