//! GeoJSON export of a region graph.
//!
//! Every live node becomes one `Feature` whose geometry outlines the
//! node's pixels and whose properties carry the node label under a
//! configurable field name (`"DN"` by default). Coordinates are pixel
//! corners in raster space: x to the right, y down, the pixel `(x, y)`
//! spanning `[x, x + 1] x [y, y + 1]`.
//!
//! Outlines follow pixel edges exactly. A region's pixels are first split
//! into connected components under the tracing connectivity, then each
//! component's boundary edges are chained into closed rings. Where two
//! pixels of a component touch only at a corner the chaining has a choice
//! at that vertex: 4-connected tracing keeps the pixels apart, 8-connected
//! tracing walks through the corner and keeps them in one ring.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use std::collections::{BTreeMap, BTreeSet};

use geo::orient::{Direction, Orient};
use geo::{Area, BoundingRect, LineString, MultiPolygon, Polygon};
use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};
use log::debug;
use serde_json::{Map, Value, json};

use segraph_graph::{Coord, Dimensions, LabelGraph, NodeId};

/// Property name used for the label when none is configured.
pub const DEFAULT_FIELD_NAME: &str = "DN";

/// Options controlling vector export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorOptions {
    /// Name of the integer property carrying the region label.
    pub field_name: String,
    /// Trace outlines under 8-connectivity instead of 4-connectivity.
    pub use_8_connected: bool,
}

impl Default for VectorOptions {
    fn default() -> Self {
        Self {
            field_name: DEFAULT_FIELD_NAME.to_owned(),
            use_8_connected: false,
        }
    }
}

/// Errors from vector export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The label field name is empty.
    #[error("label field name must not be empty")]
    EmptyFieldName,

    /// A node holds no pixels, so it has no outline.
    #[error("node {0} has no pixels")]
    EmptyRegion(NodeId),

    /// A node references a pixel outside the raster.
    #[error("pixel {coord} lies outside the {}x{} raster", .dimensions.width, .dimensions.height)]
    PixelOutOfBounds {
        /// The offending linear coordinate.
        coord: Coord,
        /// Raster the graph was built from.
        dimensions: Dimensions,
    },

    /// Boundary chaining reached a vertex with no way out.
    #[error("open boundary at pixel corner ({0}, {1})")]
    OpenBoundary(u32, u32),

    /// JSON encoding failed.
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize `graph` as a GeoJSON `FeatureCollection`.
///
/// Features appear in ascending node-id order; each feature's `id` is
/// its node id.
///
/// # Errors
///
/// Returns [`ExportError::EmptyFieldName`] for an empty field name,
/// [`ExportError::EmptyRegion`] for a node without pixels, and
/// [`ExportError::PixelOutOfBounds`] if a pixel does not fit
/// `dimensions`.
pub fn to_geojson(
    graph: &LabelGraph,
    dimensions: Dimensions,
    options: &VectorOptions,
) -> Result<String, ExportError> {
    if options.field_name.is_empty() {
        return Err(ExportError::EmptyFieldName);
    }

    let mut features = Vec::with_capacity(graph.live_count());
    for node in graph.nodes() {
        let pixels = node.attribute().pixels();
        if pixels.is_empty() {
            return Err(ExportError::EmptyRegion(node.id()));
        }
        let outline = region_outline(pixels, dimensions, options.use_8_connected)?;

        let mut properties = Map::new();
        properties.insert(
            options.field_name.clone(),
            Value::from(node.attribute().label()),
        );
        features.push(json!({
            "type": "Feature",
            "id": node.id().index(),
            "properties": properties,
            "geometry": geometry_json(&outline),
        }));
    }

    debug!(
        "geojson: {} features ({}-connected outlines)",
        features.len(),
        if options.use_8_connected { 8 } else { 4 },
    );
    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    Ok(serde_json::to_string(&collection)?)
}

/// Outline of a set of pixels: one polygon per connected component,
/// exterior rings counter-clockwise and holes clockwise (in the numeric
/// sense of [`geo::orient::Direction::Default`]).
///
/// # Errors
///
/// Returns [`ExportError::PixelOutOfBounds`] if a pixel does not fit
/// `dimensions`.
pub fn region_outline(
    pixels: &[Coord],
    dimensions: Dimensions,
    use_8_connected: bool,
) -> Result<MultiPolygon<f64>, ExportError> {
    let positions = pixels
        .iter()
        .map(|&coord| {
            dimensions
                .position(coord)
                .ok_or(ExportError::PixelOutOfBounds { coord, dimensions })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let Some(&(first_x, first_y)) = positions.first() else {
        return Ok(MultiPolygon::new(Vec::new()));
    };

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first_x, first_y, first_x, first_y);
    for &(x, y) in &positions {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    let mut mask = GrayImage::new(max_x - min_x + 1, max_y - min_y + 1);
    for &(x, y) in &positions {
        mask.put_pixel(x - min_x, y - min_y, Luma([1]));
    }
    let connectivity = if use_8_connected {
        Connectivity::Eight
    } else {
        Connectivity::Four
    };
    let components = connected_components(&mask, connectivity, Luma([0u8]));

    // Boundary edges per component, keyed by start vertex. Pixel sides
    // are oriented so the pixel lies to the right of the direction of
    // travel.
    let mut boundaries: BTreeMap<u32, BTreeMap<Vertex, Vec<Vertex>>> = BTreeMap::new();
    for (x, y, component) in components.enumerate_pixels() {
        let component = component.0[0];
        if component == 0 {
            continue;
        }
        let inside = |dx: i64, dy: i64| {
            let nx = i64::from(x) + dx;
            let ny = i64::from(y) + dy;
            u32::try_from(nx)
                .ok()
                .zip(u32::try_from(ny).ok())
                .and_then(|(nx, ny)| mask.get_pixel_checked(nx, ny))
                .is_some_and(|p| p.0[0] != 0)
        };
        let edges = boundaries.entry(component).or_default();
        let mut add = |from: Vertex, to: Vertex| edges.entry(from).or_default().push(to);
        if !inside(0, -1) {
            add((x, y), (x + 1, y));
        }
        if !inside(1, 0) {
            add((x + 1, y), (x + 1, y + 1));
        }
        if !inside(0, 1) {
            add((x + 1, y + 1), (x, y + 1));
        }
        if !inside(-1, 0) {
            add((x, y + 1), (x, y));
        }
    }

    let turn = if use_8_connected { Turn::Left } else { Turn::Right };
    let mut polygons = Vec::with_capacity(boundaries.len());
    for edges in boundaries.values() {
        let rings = trace_rings(edges, turn)?
            .into_iter()
            .map(|ring| {
                LineString::from(
                    ring.into_iter()
                        .map(|(x, y)| (f64::from(x + min_x), f64::from(y + min_y)))
                        .collect::<Vec<_>>(),
                )
            })
            .collect();
        polygons.extend(assemble(rings));
    }
    Ok(MultiPolygon::new(polygons))
}

/// A pixel corner in mask-local coordinates.
type Vertex = (u32, u32);

/// Which way to leave a vertex where two boundary paths cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    Left,
    Right,
}

fn direction(from: Vertex, to: Vertex) -> (i64, i64) {
    (
        i64::from(to.0) - i64::from(from.0),
        i64::from(to.1) - i64::from(from.1),
    )
}

/// Chain directed boundary edges into closed rings of corner vertices.
///
/// At every vertex each incoming edge is paired with exactly one
/// outgoing edge, so following successors from any edge returns to it.
fn trace_rings(
    edges: &BTreeMap<Vertex, Vec<Vertex>>,
    turn: Turn,
) -> Result<Vec<Vec<Vertex>>, ExportError> {
    let mut used = BTreeSet::new();
    let mut rings = Vec::new();

    for (&from, targets) in edges {
        for &to in targets {
            if used.contains(&(from, to)) {
                continue;
            }
            let start = (from, to);
            let mut current = start;
            let mut ring = Vec::new();
            loop {
                used.insert(current);
                ring.push(current.0);
                current = successor(edges, current, turn)?;
                if current == start {
                    break;
                }
                if used.contains(&current) {
                    return Err(ExportError::OpenBoundary(current.0.0, current.0.1));
                }
            }
            rings.push(drop_collinear(ring));
        }
    }
    Ok(rings)
}

fn successor(
    edges: &BTreeMap<Vertex, Vec<Vertex>>,
    (from, at): (Vertex, Vertex),
    turn: Turn,
) -> Result<(Vertex, Vertex), ExportError> {
    let outgoing = edges
        .get(&at)
        .ok_or(ExportError::OpenBoundary(at.0, at.1))?;
    if let [only] = outgoing.as_slice() {
        return Ok((at, *only));
    }
    // Two paths cross at a pinch corner; pick by turning direction
    // (positive cross product is a right turn with y pointing down).
    let (ix, iy) = direction(from, at);
    outgoing
        .iter()
        .find(|&&to| {
            let (ox, oy) = direction(at, to);
            let cross = ix * oy - iy * ox;
            match turn {
                Turn::Right => cross > 0,
                Turn::Left => cross < 0,
            }
        })
        .map(|&to| (at, to))
        .ok_or(ExportError::OpenBoundary(at.0, at.1))
}

/// Keep only the vertices where the ring changes direction.
fn drop_collinear(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    if n < 4 {
        return ring;
    }
    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let next = ring[(i + 1) % n];
            direction(prev, ring[i]) != direction(ring[i], next)
        })
        .map(|i| ring[i])
        .collect()
}

/// Split rings into exteriors (positive signed area) and holes, attach
/// each hole to the smallest exterior whose bounds contain it, and
/// orient the result.
fn assemble(rings: Vec<LineString<f64>>) -> Vec<Polygon<f64>> {
    let mut exteriors: Vec<(LineString<f64>, f64, Vec<LineString<f64>>)> = Vec::new();
    let mut holes = Vec::new();
    for ring in rings {
        let area = Polygon::new(ring.clone(), Vec::new()).signed_area();
        if area > 0.0 {
            exteriors.push((ring, area, Vec::new()));
        } else {
            holes.push(ring);
        }
    }

    for hole in holes {
        let Some(bounds) = hole.bounding_rect() else {
            continue;
        };
        let owner = exteriors
            .iter_mut()
            .filter(|(ring, _, _)| {
                ring.bounding_rect().is_some_and(|outer| {
                    outer.min().x <= bounds.min().x
                        && outer.min().y <= bounds.min().y
                        && outer.max().x >= bounds.max().x
                        && outer.max().y >= bounds.max().y
                })
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((_, _, interiors)) = owner {
            interiors.push(hole);
        }
    }

    exteriors
        .into_iter()
        .map(|(exterior, _, interiors)| {
            Polygon::new(exterior, interiors).orient(Direction::Default)
        })
        .collect()
}

fn ring_json(ring: &LineString<f64>) -> Value {
    Value::Array(ring.coords().map(|c| json!([c.x, c.y])).collect())
}

fn polygon_json(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![ring_json(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_json));
    Value::Array(rings)
}

fn geometry_json(outline: &MultiPolygon<f64>) -> Value {
    match outline.0.as_slice() {
        [single] => json!({
            "type": "Polygon",
            "coordinates": polygon_json(single),
        }),
        many => json!({
            "type": "MultiPolygon",
            "coordinates": many.iter().map(polygon_json).collect::<Vec<_>>(),
        }),
    }
}
