//! Property-based tests for label contraction and the graph file codec.
//!
//! 1. Contracted regions are exactly the connected same-label components
//!    (checked against `imageproc::region_labelling`).
//! 2. Every contracted graph satisfies the structural invariants.
//! 3. Contraction is deterministic.
//! 4. A fixpoint graph stays unchanged under further passes.
//! 5. Edge boundaries count adjacent pixel pairs.
//! 6. Graph files round-trip.
//! 7. Arbitrary mutation sequences keep the graph well formed.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, BTreeSet};

use imageproc::region_labelling::{self, Connectivity as OracleConnectivity};
use proptest::prelude::*;
use segraph_graph::{
    Connectivity, Contracting, GraphError, LabelGraph, LabelImage, LabelNodeAttribute, Luma, NodeId,
    label_image_to_graph, read_graph, write_graph,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// Small rasters with few distinct labels, so regions are non-trivial.
fn label_image_strategy() -> impl Strategy<Value = LabelImage> {
    (1u32..=12, 1u32..=12).prop_flat_map(|(w, h)| {
        proptest::collection::vec(0u32..4, (w * h) as usize)
            .prop_map(move |values| LabelImage::from_raw(w, h, values).unwrap())
    })
}

fn connectivity_strategy() -> impl Strategy<Value = Connectivity> {
    prop_oneof![Just(Connectivity::Four), Just(Connectivity::Eight)]
}

const fn oracle(connectivity: Connectivity) -> OracleConnectivity {
    match connectivity {
        Connectivity::Four => OracleConnectivity::Four,
        Connectivity::Eight => OracleConnectivity::Eight,
    }
}

/// Pixel sets of the oracle's components.
fn oracle_regions(image: &LabelImage, connectivity: Connectivity) -> BTreeSet<Vec<u64>> {
    let components =
        region_labelling::connected_components(image, oracle(connectivity), Luma([u32::MAX]));
    let mut by_component: BTreeMap<u32, Vec<u64>> = BTreeMap::new();
    let width = u64::from(image.width());
    for (x, y, pixel) in components.enumerate_pixels() {
        by_component
            .entry(pixel.0[0])
            .or_default()
            .push(u64::from(x) + u64::from(y) * width);
    }
    by_component.into_values().collect()
}

fn graph_regions(graph: &LabelGraph) -> BTreeSet<Vec<u64>> {
    graph
        .nodes()
        .map(|n| n.attribute().pixels().to_vec())
        .collect()
}

/// `(pixels, neighbors' pixels, boundary)` snapshot, independent of ids.
fn shape(graph: &LabelGraph) -> BTreeSet<(u32, Vec<u64>, Vec<(u64, u32)>)> {
    graph
        .nodes()
        .map(|n| {
            let mut neighbors: Vec<(u64, u32)> = n
                .neighbors()
                .map(|(id, edge)| {
                    let first = graph.node(id).unwrap().attribute().pixels()[0];
                    (first, edge.boundary())
                })
                .collect();
            neighbors.sort_unstable();
            (
                n.attribute().label(),
                n.attribute().pixels().to_vec(),
                neighbors,
            )
        })
        .collect()
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Regions match connected components
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn regions_match_connected_components(
        image in label_image_strategy(),
        connectivity in connectivity_strategy(),
    ) {
        init_logging();
        let graph = label_image_to_graph(&image, connectivity).unwrap();
        prop_assert_eq!(graph_regions(&graph), oracle_regions(&image, connectivity));

        let covered: usize = graph.nodes().map(|n| n.attribute().pixel_count()).sum();
        prop_assert_eq!(covered, (image.width() * image.height()) as usize);
        for node in graph.nodes() {
            let (x, y) = (
                node.attribute().pixels()[0] % u64::from(image.width()),
                node.attribute().pixels()[0] / u64::from(image.width()),
            );
            let value = image.get_pixel(x as u32, y as u32).0[0];
            prop_assert_eq!(node.attribute().label(), value);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Structural invariants and no same-label neighbors
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn contracted_graph_is_well_formed(
        image in label_image_strategy(),
        connectivity in connectivity_strategy(),
    ) {
        let graph = label_image_to_graph(&image, connectivity).unwrap();
        prop_assert!(graph.check_invariants().is_ok());
        for node in graph.nodes() {
            for (neighbor, _) in node.neighbors() {
                prop_assert_ne!(
                    graph.node(neighbor).unwrap().attribute().label(),
                    node.attribute().label(),
                    "adjacent regions {} and {} share a label",
                    node.id(),
                    neighbor
                );
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Determinism
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn contraction_is_deterministic(
        image in label_image_strategy(),
        connectivity in connectivity_strategy(),
    ) {
        let a = label_image_to_graph(&image, connectivity).unwrap();
        let b = label_image_to_graph(&image, connectivity).unwrap();
        prop_assert_eq!(a.live_ids(), b.live_ids());
        prop_assert_eq!(shape(&a), shape(&b));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Fixpoint is stable
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn fixpoint_is_idempotent(
        image in label_image_strategy(),
        connectivity in connectivity_strategy(),
    ) {
        let graph = label_image_to_graph(&image, connectivity).unwrap();
        let before = shape(&graph);
        let mut stage = Contracting::from_graph(graph);
        prop_assert!(!stage.do_one_iteration().unwrap());
        prop_assert_eq!(shape(stage.graph()), before);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Boundaries count adjacent pixel pairs
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn boundaries_count_pixel_pairs(
        image in label_image_strategy(),
        connectivity in connectivity_strategy(),
    ) {
        let graph = label_image_to_graph(&image, connectivity).unwrap();
        let width = i64::from(image.width());
        let height = i64::from(image.height());

        let mut owner = BTreeMap::new();
        for node in graph.nodes() {
            for &p in node.attribute().pixels() {
                owner.insert(p, node.id());
            }
        }

        let mut expected: BTreeMap<_, u32> = BTreeMap::new();
        for y in 0..height {
            for x in 0..width {
                for &(dx, dy) in connectivity.forward_offsets() {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || nx >= width || ny >= height {
                        continue;
                    }
                    let a = owner[&((x + y * width) as u64)];
                    let b = owner[&((nx + ny * width) as u64)];
                    if a != b {
                        *expected.entry((a.min(b), a.max(b))).or_default() += 1;
                    }
                }
            }
        }

        let mut actual = BTreeMap::new();
        for node in graph.nodes() {
            for (neighbor, edge) in node.neighbors() {
                if node.id() < neighbor {
                    actual.insert((node.id(), neighbor), edge.boundary());
                }
            }
        }
        prop_assert_eq!(actual, expected);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Graph file round trip
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn graph_file_round_trip(
        image in label_image_strategy(),
        connectivity in connectivity_strategy(),
    ) {
        let graph = label_image_to_graph(&image, connectivity).unwrap();
        let bytes = write_graph(&graph).unwrap();
        let back: LabelGraph = read_graph(&bytes).unwrap();
        prop_assert_eq!(back.id_capacity(), graph.id_capacity());
        prop_assert_eq!(back.live_ids(), graph.live_ids());
        prop_assert_eq!(shape(&back), shape(&graph));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 7. Mutation sequences
// ═════════════════════════════════════════════════════════════════════════

/// One graph operation on raw ids, which may be unknown or tombstoned.
#[derive(Debug, Clone)]
enum Mutation {
    AddNode(u32),
    AddEdge(usize, usize),
    AddBoundary(usize, usize, u32),
    Remove(usize),
    Merge(usize, usize),
}

fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    let id = 0usize..16;
    prop_oneof![
        1 => (0u32..3).prop_map(Mutation::AddNode),
        3 => (id.clone(), id.clone()).prop_map(|(a, b)| Mutation::AddEdge(a, b)),
        2 => (id.clone(), id.clone(), 1u32..50).prop_map(|(a, b, w)| Mutation::AddBoundary(a, b, w)),
        1 => id.clone().prop_map(Mutation::Remove),
        3 => (id.clone(), id).prop_map(|(a, b)| Mutation::Merge(a, b)),
    ]
}

type Snapshot = (usize, Vec<(usize, LabelNodeAttribute, Vec<(usize, u32)>)>);

fn snapshot(graph: &LabelGraph) -> Snapshot {
    let nodes = graph
        .nodes()
        .map(|n| {
            let edges = n.neighbors().map(|(m, e)| (m.index(), e.boundary())).collect();
            (n.id().index(), n.attribute().clone(), edges)
        })
        .collect();
    (graph.id_capacity(), nodes)
}

fn total_boundary(graph: &LabelGraph) -> u64 {
    graph
        .nodes()
        .flat_map(|n| n.neighbors().map(|(_, e)| u64::from(e.boundary())))
        .sum::<u64>()
        / 2
}

proptest! {
    #[test]
    fn mutation_sequences_preserve_invariants(
        initial in 1usize..8,
        mutations in proptest::collection::vec(mutation_strategy(), 0..40),
    ) {
        let mut graph = LabelGraph::new();
        for i in 0..initial {
            graph.add_node(LabelNodeAttribute::single(u32::try_from(i % 3).unwrap(), i as u64));
        }

        for mutation in mutations {
            let before = snapshot(&graph);
            let live = graph.live_count();
            let boundary = total_boundary(&graph);

            let result = match mutation {
                Mutation::AddNode(label) => {
                    let pixel = graph.id_capacity() as u64;
                    let id = graph.add_node(LabelNodeAttribute::single(label, pixel));
                    prop_assert_eq!(id.index(), before.0);
                    prop_assert_eq!(graph.live_count(), live + 1);
                    Ok(())
                }
                Mutation::AddEdge(a, b) => {
                    let (a, b) = (NodeId::new(a), NodeId::new(b));
                    let existed = graph.get(a).and_then(|n| n.edge(b)).is_some();
                    let result = graph.add_edge(a, b);
                    if result.is_ok() {
                        prop_assert_eq!(total_boundary(&graph), boundary + u64::from(!existed));
                    }
                    result
                }
                Mutation::AddBoundary(a, b, w) => {
                    let result = graph.add_boundary(NodeId::new(a), NodeId::new(b), w);
                    if result.is_ok() {
                        prop_assert_eq!(total_boundary(&graph), boundary + u64::from(w));
                    }
                    result
                }
                Mutation::Remove(id) => {
                    let id = NodeId::new(id);
                    let result = graph.remove_node(id).map(|_| ());
                    if result.is_ok() {
                        prop_assert!(!graph.is_live(id));
                        prop_assert_eq!(graph.live_count(), live - 1);
                    }
                    result
                }
                Mutation::Merge(keep, absorb) => {
                    let (keep, absorb) = (NodeId::new(keep), NodeId::new(absorb));
                    let shared = graph
                        .get(keep)
                        .and_then(|n| n.edge(absorb))
                        .map_or(0, |e| u64::from(e.boundary()));
                    let pixels = [keep, absorb]
                        .iter()
                        .filter_map(|&id| graph.get(id))
                        .map(|n| n.attribute().pixels().len())
                        .sum::<usize>();
                    let result = graph.merge_nodes(keep, absorb);
                    if keep == absorb {
                        prop_assert_eq!(result.clone(), Err(GraphError::SelfLoop(keep)));
                    }
                    if result.is_ok() {
                        prop_assert_eq!(graph.live_count(), live - 1);
                        prop_assert!(!graph.is_live(absorb));
                        prop_assert_eq!(graph.node(keep).unwrap().attribute().pixels().len(), pixels);
                        prop_assert_eq!(total_boundary(&graph), boundary - shared);
                    }
                    result
                }
            };

            if result.is_err() {
                prop_assert_eq!(snapshot(&graph), before);
            }
            prop_assert!(graph.check_invariants().is_ok());
            prop_assert_eq!(graph.live_ids().len(), graph.live_count());
        }
    }
}

// ── Worked example ──────────────────────────────────────────────────────

#[test]
fn three_by_three_regions_and_adjacency() {
    init_logging();
    let image = LabelImage::from_raw(3, 3, vec![1, 1, 2, 1, 1, 2, 3, 3, 2]).unwrap();
    let graph = label_image_to_graph(&image, Connectivity::Four).unwrap();

    let by_label: BTreeMap<u32, _> = graph
        .nodes()
        .map(|n| (n.attribute().label(), n))
        .collect();
    assert_eq!(by_label.len(), 3);
    assert_eq!(by_label[&1].attribute().pixels(), &[0, 1, 3, 4]);
    assert_eq!(by_label[&2].attribute().pixels(), &[2, 5, 8]);
    assert_eq!(by_label[&3].attribute().pixels(), &[6, 7]);

    let pairs: BTreeSet<(u32, u32)> = graph
        .nodes()
        .flat_map(|n| {
            let label = n.attribute().label();
            n.neighbors()
                .map(|(id, _)| graph.node(id).unwrap().attribute().label())
                .filter(move |&other| label < other)
                .map(move |other| (label, other))
                .collect::<Vec<_>>()
        })
        .collect();
    assert_eq!(
        pairs,
        BTreeSet::from([(1, 2), (1, 3), (2, 3)])
    );
}
