//! Region-adjacency graph: an arena of nodes addressed by stable ids.
//!
//! Nodes are never physically deleted. [`Graph::remove_node`] and
//! [`Graph::merge_nodes`] tombstone the node instead, so an id captured
//! before a removal can never alias a different node later. Neighbor
//! lists are kept sorted by id, which makes every traversal (and hence
//! every contraction run) deterministic.
//!
//! Invariants maintained by every mutating operation:
//!
//! - adjacency is symmetric,
//! - at most one edge joins any pair of nodes,
//! - no node is adjacent to itself,
//! - live nodes never reference tombstoned ones.
//!
//! Operations validate their arguments before touching the arena, so a
//! rejected call leaves the graph exactly as it was.
//!
//! The graph is a single-writer structure with no internal locking.

use std::collections::TryReserveError;

use serde::{Deserialize, Serialize};

use crate::attribute::Attribute;
use crate::types::{GraphError, NodeId};

/// Adjacency metadata between two regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    boundary: u32,
}

impl Edge {
    /// An edge backed by `boundary` adjacent pixel pairs.
    #[must_use]
    pub const fn new(boundary: u32) -> Self {
        Self { boundary }
    }

    /// Number of pixel pairs the two regions share along their border.
    #[must_use]
    pub const fn boundary(self) -> u32 {
        self.boundary
    }
}

/// A region: stable id, owned attribute, sorted adjacency.
#[derive(Debug, Clone)]
pub struct Node<A> {
    id: NodeId,
    attribute: A,
    edges: Vec<(NodeId, Edge)>,
}

impl<A> Node<A> {
    /// The node's id.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// The node's payload.
    #[must_use]
    pub const fn attribute(&self) -> &A {
        &self.attribute
    }

    /// Neighbors in ascending id order.
    pub fn neighbors(&self) -> impl Iterator<Item = (NodeId, Edge)> + '_ {
        self.edges.iter().copied()
    }

    /// Number of neighbors.
    #[must_use]
    pub fn degree(&self) -> usize {
        self.edges.len()
    }

    /// The edge to `other`, if adjacent.
    #[must_use]
    pub fn edge(&self, other: NodeId) -> Option<Edge> {
        self.find(other).ok().map(|i| self.edges[i].1)
    }

    fn find(&self, other: NodeId) -> Result<usize, usize> {
        self.edges.binary_search_by_key(&other, |&(id, _)| id)
    }

    /// Insert an edge or add `boundary` to the existing one.
    fn accumulate(&mut self, other: NodeId, boundary: u32) {
        match self.find(other) {
            Ok(i) => {
                let edge = &mut self.edges[i].1;
                edge.boundary = edge.boundary.saturating_add(boundary);
            }
            Err(i) => self.edges.insert(i, (other, Edge::new(boundary))),
        }
    }

    /// Insert an edge unless one already exists.
    fn insert_if_absent(&mut self, other: NodeId, edge: Edge) {
        if let Err(i) = self.find(other) {
            self.edges.insert(i, (other, edge));
        }
    }

    fn detach(&mut self, other: NodeId) -> Option<Edge> {
        self.find(other).ok().map(|i| self.edges.remove(i).1)
    }
}

/// Owning container of all nodes of one region-adjacency graph.
#[derive(Debug, Clone)]
pub struct Graph<A> {
    nodes: Vec<Node<A>>,
    live: Vec<bool>,
    live_count: usize,
}

impl<A: Attribute> Default for Graph<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Attribute> Graph<A> {
    /// An empty graph.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            live: Vec::new(),
            live_count: 0,
        }
    }

    /// An empty graph with room for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            live: Vec::with_capacity(capacity),
            live_count: 0,
        }
    }

    /// A graph whose first `capacity` ids are allocated but tombstoned.
    ///
    /// Used by readers that restore a sparse id space before reviving
    /// the nodes that were live when the graph was written.
    pub(crate) fn with_tombstones(capacity: usize) -> Result<Self, TryReserveError> {
        let mut nodes = Vec::new();
        nodes.try_reserve_exact(capacity)?;
        let mut live = Vec::new();
        live.try_reserve_exact(capacity)?;
        nodes.extend((0..capacity).map(|i| Node {
            id: NodeId::new(i),
            attribute: A::default(),
            edges: Vec::new(),
        }));
        live.resize(capacity, false);
        Ok(Self {
            nodes,
            live,
            live_count: 0,
        })
    }

    /// Bring a tombstoned slot back to life with `attribute` and the
    /// given adjacency. The adjacency is not cross-checked here; callers
    /// run [`check_invariants`](Self::check_invariants) once every node
    /// has been restored.
    pub(crate) fn revive(
        &mut self,
        id: NodeId,
        attribute: A,
        edges: Vec<(NodeId, Edge)>,
    ) -> Result<(), GraphError> {
        let slot = self
            .nodes
            .get_mut(id.index())
            .ok_or(GraphError::UnknownNode(id))?;
        if self.live[id.index()] {
            return Err(GraphError::DuplicateNode(id));
        }
        slot.attribute = attribute;
        slot.edges = edges;
        self.live[id.index()] = true;
        self.live_count += 1;
        Ok(())
    }

    /// Allocate the next id and insert a live node holding `attribute`.
    pub fn add_node(&mut self, attribute: A) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node {
            id,
            attribute,
            edges: Vec::new(),
        });
        self.live.push(true);
        self.live_count += 1;
        id
    }

    /// Connect `a` and `b` with a single-pixel-pair edge.
    ///
    /// Idempotent: an existing edge is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::SelfLoop`] if `a == b`, or
    /// [`GraphError::UnknownNode`] / [`GraphError::Tombstoned`] if either
    /// id is not a live node.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) -> Result<(), GraphError> {
        self.check_pair(a, b)?;
        self.nodes[a.index()].insert_if_absent(b, Edge::new(1));
        self.nodes[b.index()].insert_if_absent(a, Edge::new(1));
        Ok(())
    }

    /// Record `pixels` more shared-border pixel pairs between `a` and
    /// `b`, creating the edge if needed.
    ///
    /// # Errors
    ///
    /// Same as [`add_edge`](Self::add_edge).
    pub fn add_boundary(&mut self, a: NodeId, b: NodeId, pixels: u32) -> Result<(), GraphError> {
        self.check_pair(a, b)?;
        self.nodes[a.index()].accumulate(b, pixels);
        self.nodes[b.index()].accumulate(a, pixels);
        Ok(())
    }

    /// Detach `id` from all neighbors and tombstone it, returning its
    /// attribute. The id stays allocated and is never reassigned.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] / [`GraphError::Tombstoned`]
    /// if `id` is not a live node.
    pub fn remove_node(&mut self, id: NodeId) -> Result<A, GraphError> {
        self.check_live(id)?;
        let node = &mut self.nodes[id.index()];
        let edges = std::mem::take(&mut node.edges);
        let attribute = std::mem::take(&mut node.attribute);
        for (neighbor, _) in edges {
            self.nodes[neighbor.index()].detach(id);
        }
        self.tombstone(id);
        Ok(attribute)
    }

    /// Merge `absorb` into `keep`.
    ///
    /// `absorb`'s attribute is folded into `keep`'s via
    /// [`Attribute::absorb`]. Every neighbor of `absorb` other than `keep`
    /// is re-pointed to `keep`; where `keep` was already adjacent to that
    /// neighbor the two edges collapse into one whose boundary is the sum.
    /// The `keep`–`absorb` edge disappears and `absorb` is tombstoned.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::SelfLoop`] if `keep == absorb`, or
    /// [`GraphError::UnknownNode`] / [`GraphError::Tombstoned`] if either
    /// id is not a live node.
    pub fn merge_nodes(&mut self, keep: NodeId, absorb: NodeId) -> Result<(), GraphError> {
        self.check_pair(keep, absorb)?;

        let absorbed = &mut self.nodes[absorb.index()];
        let edges = std::mem::take(&mut absorbed.edges);
        let attribute = std::mem::take(&mut absorbed.attribute);

        for (neighbor, edge) in edges {
            self.nodes[neighbor.index()].detach(absorb);
            if neighbor == keep {
                continue;
            }
            self.nodes[keep.index()].accumulate(neighbor, edge.boundary);
            self.nodes[neighbor.index()].accumulate(keep, edge.boundary);
        }

        self.nodes[keep.index()].attribute.absorb(attribute);
        self.tombstone(absorb);
        Ok(())
    }

    /// The live node with id `id`, if any.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node<A>> {
        self.is_live(id).then(|| &self.nodes[id.index()])
    }

    /// The live node with id `id`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] / [`GraphError::Tombstoned`]
    /// if `id` is not a live node.
    pub fn node(&self, id: NodeId) -> Result<&Node<A>, GraphError> {
        self.check_live(id)?;
        Ok(&self.nodes[id.index()])
    }

    /// Mutable access to a live node's attribute.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] / [`GraphError::Tombstoned`]
    /// if `id` is not a live node.
    pub fn attribute_mut(&mut self, id: NodeId) -> Result<&mut A, GraphError> {
        self.check_live(id)?;
        Ok(&mut self.nodes[id.index()].attribute)
    }

    /// Neighbors of a live node in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] / [`GraphError::Tombstoned`]
    /// if `id` is not a live node.
    pub fn neighbors(
        &self,
        id: NodeId,
    ) -> Result<impl Iterator<Item = (NodeId, Edge)> + '_, GraphError> {
        Ok(self.node(id)?.neighbors())
    }

    /// Whether `id` names a live node.
    #[must_use]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.live.get(id.index()).copied().unwrap_or(false)
    }

    /// Live nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node<A>> + '_ {
        self.nodes
            .iter()
            .zip(&self.live)
            .filter_map(|(node, &live)| live.then_some(node))
    }

    /// Snapshot of the live ids in ascending order.
    #[must_use]
    pub fn live_ids(&self) -> Vec<NodeId> {
        self.nodes().map(Node::id).collect()
    }

    /// Number of live nodes.
    #[must_use]
    pub const fn live_count(&self) -> usize {
        self.live_count
    }

    /// Whether the graph has no live nodes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Number of ids ever allocated (live plus tombstoned).
    #[must_use]
    pub const fn id_capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Number of undirected edges between live nodes.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes().map(Node::degree).sum::<usize>() / 2
    }

    /// Sum of [`Attribute::memory_size`] over live nodes.
    #[must_use]
    pub fn memory_size(&self) -> u64 {
        self.nodes().map(|n| n.attribute.memory_size()).sum()
    }

    /// Verify every structural invariant, reporting the first violation.
    ///
    /// # Errors
    ///
    /// Returns the [`GraphError`] describing the first broken invariant
    /// found in ascending id order.
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        for node in self.nodes() {
            let mut previous: Option<NodeId> = None;
            for (neighbor, edge) in node.neighbors() {
                if neighbor == node.id {
                    return Err(GraphError::SelfLoop(node.id));
                }
                if let Some(prev) = previous
                    && prev >= neighbor
                {
                    return Err(GraphError::DuplicateEdge(node.id, neighbor));
                }
                previous = Some(neighbor);

                if neighbor.index() >= self.nodes.len() {
                    return Err(GraphError::UnknownNode(neighbor));
                }
                if !self.live[neighbor.index()] {
                    return Err(GraphError::DanglingEdge(node.id, neighbor));
                }
                if self.nodes[neighbor.index()].edge(node.id) != Some(edge) {
                    return Err(GraphError::AsymmetricEdge(node.id, neighbor));
                }
            }
        }
        Ok(())
    }

    fn check_live(&self, id: NodeId) -> Result<(), GraphError> {
        match self.live.get(id.index()) {
            None => Err(GraphError::UnknownNode(id)),
            Some(false) => Err(GraphError::Tombstoned(id)),
            Some(true) => Ok(()),
        }
    }

    fn check_pair(&self, a: NodeId, b: NodeId) -> Result<(), GraphError> {
        if a == b {
            return Err(GraphError::SelfLoop(a));
        }
        self.check_live(a)?;
        self.check_live(b)
    }

    fn tombstone(&mut self, id: NodeId) {
        self.live[id.index()] = false;
        self.live_count -= 1;
    }
}
