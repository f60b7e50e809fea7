//! Integration test: full tiled runs against an untiled union-find oracle.
//!
//! A 16-bit PNG raster is written to a temp directory, segmented in small
//! tiles on several workers, stitched and persisted. The persisted graph
//! must describe exactly the connected same-label regions of the raster.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use image::{ImageBuffer, Luma};
use petgraph::unionfind::UnionFind;
use segraph_graph::{Connectivity, Coord, LabelGraph, read_graph};
use segraph_scheduler::{
    OutputConfig, SchedulerConfig, SchedulerError, read_region_index_image, run,
};

const WIDTH: u32 = 23;
const HEIGHT: u32 = 17;

/// Bands, a diagonal line, a ring crossing tile borders and a
/// checkerboard corner.
fn label_at(x: u32, y: u32) -> u16 {
    if (6..15).contains(&x) && (4..12).contains(&y) && !((8..13).contains(&x) && (6..10).contains(&y)) {
        40
    } else if x >= 17 && y >= 11 {
        50 + u16::try_from((x + y) % 2).unwrap()
    } else if x == y {
        7
    } else {
        u16::try_from(y / 6).unwrap() + 1
    }
}

fn write_input(path: &Path) {
    let raster: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(WIDTH, HEIGHT, |x, y| Luma([label_at(x, y)]));
    raster.save(path).unwrap();
}

/// Connected same-label pixel sets, via union-find over pixel pairs.
fn oracle(connectivity: Connectivity) -> Vec<(u32, Vec<Coord>)> {
    let index = |x: u32, y: u32| (y * WIDTH + x) as usize;
    let mut sets = UnionFind::<usize>::new((WIDTH * HEIGHT) as usize);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            for &(dx, dy) in connectivity.forward_offsets() {
                let (nx, ny) = (i64::from(x) + dx, i64::from(y) + dy);
                if nx < 0 || nx >= i64::from(WIDTH) || ny >= i64::from(HEIGHT) {
                    continue;
                }
                let (nx, ny) = (u32::try_from(nx).unwrap(), u32::try_from(ny).unwrap());
                if label_at(x, y) == label_at(nx, ny) {
                    sets.union(index(x, y), index(nx, ny));
                }
            }
        }
    }
    let mut groups: BTreeMap<usize, (u32, Vec<Coord>)> = BTreeMap::new();
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let entry = groups
                .entry(sets.find(index(x, y)))
                .or_insert_with(|| (u32::from(label_at(x, y)), Vec::new()));
            entry.1.push(u64::from(y * WIDTH + x));
        }
    }
    let mut regions: Vec<_> = groups.into_values().collect();
    regions.sort();
    regions
}

fn regions(graph: &LabelGraph) -> Vec<(u32, Vec<Coord>)> {
    let mut out: Vec<_> = graph
        .nodes()
        .map(|n| (n.attribute().label(), n.attribute().pixels().to_vec()))
        .collect();
    out.sort();
    out
}

fn config(dir: &Path, connectivity: Connectivity) -> SchedulerConfig {
    let output = dir.join("out");
    fs::create_dir_all(&output).unwrap();
    SchedulerConfig {
        input: dir.join("input.png"),
        tile_width: 5,
        tile_height: 4,
        memory_budget_mb: 1,
        scratch_dir: dir.join("scratch"),
        max_iterations: 64,
        connectivity,
        workers: 3,
        output: OutputConfig {
            directory: output,
            vector_name: Some("regions.geojson".to_owned()),
            ..OutputConfig::default()
        },
        ..SchedulerConfig::default()
    }
}

fn check_run(connectivity: Connectivity) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    write_input(&dir.path().join("input.png"));
    let config = config(dir.path(), connectivity);

    let report = run(&config).unwrap();
    assert_eq!(report.tiles.len(), 5 * 5);
    assert!(report.stitch.converged);
    assert!(report.cross_tile_pairs > 0);
    assert_eq!(report.outputs.len(), 3);

    let graph: LabelGraph =
        read_graph(&fs::read(config.output.directory.join("graph.sgrf")).unwrap()).unwrap();
    graph.check_invariants().unwrap();
    let expected = oracle(connectivity);
    assert_eq!(regions(&graph), expected);
    assert_eq!(report.regions, expected.len());

    // Each region is painted with one index, and indices are distinct.
    let labels = read_region_index_image(&config.output.directory.join("labels.png")).unwrap();
    let mut seen = BTreeMap::new();
    for node in graph.nodes() {
        let pixels = node.attribute().pixels();
        let first = pixels[0];
        let value = labels.get_pixel(
            u32::try_from(first % u64::from(WIDTH)).unwrap(),
            u32::try_from(first / u64::from(WIDTH)).unwrap(),
        )[0];
        for &p in pixels {
            let (x, y) = (
                u32::try_from(p % u64::from(WIDTH)).unwrap(),
                u32::try_from(p / u64::from(WIDTH)).unwrap(),
            );
            assert_eq!(labels.get_pixel(x, y)[0], value);
        }
        assert!(seen.insert(value, node.id()).is_none(), "index {value} reused");
    }

    // Spill files are gone.
    assert!(!fs::read_dir(&config.scratch_dir).is_ok_and(|mut d| d.next().is_some()));
}

#[test]
fn four_connected_run_matches_oracle() {
    check_run(Connectivity::Four);
}

#[test]
fn eight_connected_run_matches_oracle() {
    check_run(Connectivity::Eight);
}

#[test]
fn single_worker_single_tile_agrees_with_tiled_run() {
    let dir = tempfile::tempdir().unwrap();
    write_input(&dir.path().join("input.png"));
    let tiled = config(dir.path(), Connectivity::Four);
    let whole = SchedulerConfig {
        tile_width: WIDTH,
        tile_height: HEIGHT,
        workers: 1,
        ..tiled.clone()
    };

    let a = run(&tiled).unwrap();
    let tiled_graph: LabelGraph =
        read_graph(&fs::read(tiled.output.directory.join("graph.sgrf")).unwrap()).unwrap();
    let b = run(&whole).unwrap();
    let whole_graph: LabelGraph =
        read_graph(&fs::read(whole.output.directory.join("graph.sgrf")).unwrap()).unwrap();

    assert_eq!(b.tiles.len(), 1);
    assert_eq!(b.cross_tile_pairs, 0);
    assert_eq!(a.regions, b.regions);
    assert_eq!(a.edges, b.edges);
    assert_eq!(regions(&tiled_graph), regions(&whole_graph));
}

#[test]
fn missing_input_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), Connectivity::Four);
    let err = run(&config).unwrap_err();
    match err {
        SchedulerError::Io { path, .. } => assert_eq!(path, config.input),
        other => panic!("expected an I/O error, got {other}"),
    }
    assert_eq!(fs::read_dir(&config.output.directory).unwrap().count(), 0);
    assert!(!config.scratch_dir.exists());
}

#[test]
fn invalid_config_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_input(&dir.path().join("input.png"));
    let config = SchedulerConfig {
        max_iterations: 0,
        ..config(dir.path(), Connectivity::Four)
    };
    assert!(matches!(run(&config), Err(SchedulerError::InvalidConfig(_))));
    assert_eq!(fs::read_dir(&config.output.directory).unwrap().count(), 0);
}

#[test]
fn missing_output_directory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_input(&dir.path().join("input.png"));
    let mut config = config(dir.path(), Connectivity::Four);
    config.output.directory = dir.path().join("absent");
    assert!(matches!(run(&config), Err(SchedulerError::Io { .. })));
}
