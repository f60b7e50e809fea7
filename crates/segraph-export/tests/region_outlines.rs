//! Integration test: contract a label raster and export it to GeoJSON.
//!
//! The exported outlines must tile the raster: every feature's area equals
//! its region's pixel count and the areas add up to the raster size.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use geo::{Area, Coord, LineString, MultiPolygon, Polygon};
use segraph_export::{VectorOptions, to_geojson};
use segraph_graph::{Connectivity, Dimensions, LabelImage, Luma, label_image_to_graph};
use serde_json::Value;

/// A 16x12 raster with nested rings, diagonal touches and a checkerboard
/// patch.
fn sample_image() -> LabelImage {
    LabelImage::from_fn(16, 12, |x, y| {
        let label = if (3..9).contains(&x) && (2..8).contains(&y) {
            if (5..7).contains(&x) && (4..6).contains(&y) { 3 } else { 2 }
        } else if x >= 11 && y >= 6 {
            4 + (x + y) % 2
        } else if x == y {
            7
        } else {
            1
        };
        Luma([label])
    })
}

fn parse_ring(value: &Value) -> LineString<f64> {
    LineString::new(
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|p| Coord {
                x: p[0].as_f64().unwrap(),
                y: p[1].as_f64().unwrap(),
            })
            .collect(),
    )
}

fn parse_polygon(value: &Value) -> Polygon<f64> {
    let rings = value.as_array().unwrap();
    Polygon::new(
        parse_ring(&rings[0]),
        rings[1..].iter().map(parse_ring).collect(),
    )
}

fn parse_geometry(geometry: &Value) -> MultiPolygon<f64> {
    match geometry["type"].as_str().unwrap() {
        "Polygon" => MultiPolygon::new(vec![parse_polygon(&geometry["coordinates"])]),
        "MultiPolygon" => MultiPolygon::new(
            geometry["coordinates"]
                .as_array()
                .unwrap()
                .iter()
                .map(parse_polygon)
                .collect(),
        ),
        other => panic!("unexpected geometry type {other}"),
    }
}

fn check_tiling(connectivity: Connectivity, use_8_connected: bool) {
    let _ = env_logger::builder().is_test(true).try_init();
    let image = sample_image();
    let dimensions = Dimensions {
        width: image.width(),
        height: image.height(),
    };
    let graph = label_image_to_graph(&image, connectivity).unwrap();
    let options = VectorOptions {
        use_8_connected,
        ..VectorOptions::default()
    };
    let json = to_geojson(&graph, dimensions, &options).unwrap();
    let collection: Value = serde_json::from_str(&json).unwrap();
    let features = collection["features"].as_array().unwrap();
    assert_eq!(features.len(), graph.live_count());

    let mut total = 0.0;
    for (feature, node) in features.iter().zip(graph.nodes()) {
        assert_eq!(feature["id"].as_u64().unwrap(), node.id().index() as u64);
        assert_eq!(
            feature["properties"]["DN"].as_u64().unwrap(),
            u64::from(node.attribute().label())
        );
        let area = parse_geometry(&feature["geometry"]).unsigned_area();
        assert!(
            (area - node.attribute().pixel_count() as f64).abs() < 1e-9,
            "feature {} has area {area}, expected {}",
            node.id(),
            node.attribute().pixel_count()
        );
        total += area;
    }
    assert!((total - f64::from(16 * 12)).abs() < 1e-9);
}

#[test]
fn four_connected_regions_tile_the_raster() {
    check_tiling(Connectivity::Four, false);
}

#[test]
fn eight_connected_regions_tile_the_raster() {
    check_tiling(Connectivity::Eight, true);
}

#[test]
fn mixed_connectivity_still_preserves_area() {
    // Regions built 8-connected but traced 4-connected split into
    // multipolygons without losing area.
    check_tiling(Connectivity::Eight, false);
}
