//! segraph-export: vector serializers for region graphs (sans-IO).
//!
//! Converts a contracted [`LabelGraph`](segraph_graph::LabelGraph) into
//! polygon features. Currently supports GeoJSON.

pub mod geojson;

pub use geojson::{DEFAULT_FIELD_NAME, ExportError, VectorOptions, region_outline, to_geojson};
