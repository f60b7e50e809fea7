//! Binary graph file: the on-disk and cross-worker form of a [`Graph`].
//!
//! ```text
//! header  = magic "SGRF" | version u16 | kind u8 | reserved u8
//!         | id_capacity u64 | live_count u64
//! record  = id u64 | kind u8 | payload_len u64 | payload
//!         | degree u32 | degree * (neighbor u64 | boundary u32)
//! file    = header | live_count * record
//! ```
//!
//! Records are written for live nodes only, in ascending id order, so
//! tombstoned ids are preserved as gaps and a reloaded graph keeps every
//! id it had. Payloads go through the checked attribute codec.

use log::trace;

use crate::attribute::{Attribute, AttributeKind};
use crate::codec::{self, CodecError};
use crate::graph::{Edge, Graph};
use crate::types::NodeId;

/// First four bytes of every graph file.
pub const MAGIC: [u8; 4] = *b"SGRF";

/// Current format version.
pub const VERSION: u16 = 1;

/// Encode `graph`.
///
/// # Errors
///
/// Returns [`CodecError::LengthMismatch`] if an attribute's serializer
/// disagrees with its size estimate, or [`CodecError::Overflow`] if a
/// node has more neighbors than a `u32` degree can hold.
pub fn write_graph<A: Attribute>(graph: &Graph<A>) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    codec::put_u16(&mut out, VERSION);
    codec::put_u8(&mut out, A::KIND.tag());
    codec::put_u8(&mut out, 0);
    codec::put_u64(&mut out, codec::to_u64(graph.id_capacity()));
    codec::put_u64(&mut out, codec::to_u64(graph.live_count()));

    for node in graph.nodes() {
        codec::put_u64(&mut out, codec::to_u64(node.id().index()));
        codec::put_u8(&mut out, A::KIND.tag());
        codec::put_u64(&mut out, node.attribute().serialized_size());
        codec::encode_attribute(node.attribute(), &mut out)?;

        let degree = node.degree();
        let degree =
            u32::try_from(degree).map_err(|_| CodecError::Overflow(codec::to_u64(degree)))?;
        codec::put_u32(&mut out, degree);
        for (neighbor, edge) in node.neighbors() {
            codec::put_u64(&mut out, codec::to_u64(neighbor.index()));
            codec::put_u32(&mut out, edge.boundary());
        }
    }

    trace!(
        "wrote graph: {} live nodes, {} bytes",
        graph.live_count(),
        out.len()
    );
    Ok(out)
}

/// Decode a graph file holding attributes of type `A`.
///
/// The header's id capacity is trusted up to what the allocator grants;
/// use [`read_graph_bounded`] when the id space is known in advance.
///
/// # Errors
///
/// See [`read_graph_bounded`].
pub fn read_graph<A: Attribute>(bytes: &[u8]) -> Result<Graph<A>, CodecError> {
    read_graph_bounded(bytes, usize::MAX)
}

/// Decode a graph file holding attributes of type `A` whose id capacity
/// is at most `max_ids`.
///
/// Tombstoned ids cost a slot each, so readers of files from elsewhere
/// should pass the largest id space the writer could have used, e.g. the
/// pixel count of the raster or tile the graph was built from. The
/// result is validated against every graph invariant before it is
/// returned.
///
/// # Errors
///
/// Returns [`CodecError::CapacityLimit`] if the header claims more than
/// `max_ids` ids, and another [`CodecError`] for a bad header, a kind
/// other than `A::KIND`, truncated or oversized records, out-of-order or
/// out-of-range ids, trailing bytes, or adjacency that violates a graph
/// invariant.
pub fn read_graph_bounded<A: Attribute>(bytes: &[u8], max_ids: usize) -> Result<Graph<A>, CodecError> {
    let mut pos = 0;

    let magic = codec::take(bytes, &mut pos, MAGIC.len())?;
    if magic != MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        return Err(CodecError::BadMagic(found));
    }
    let version = codec::get_u16(bytes, &mut pos)?;
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    expect_kind::<A>(codec::get_u8(bytes, &mut pos)?)?;
    let reserved = codec::get_u8(bytes, &mut pos)?;
    if reserved != 0 {
        return Err(CodecError::Corrupt(format!("reserved header byte is {reserved}")));
    }

    let capacity = codec::to_usize(codec::get_u64(bytes, &mut pos)?)?;
    if capacity > max_ids {
        return Err(CodecError::CapacityLimit {
            capacity: codec::to_u64(capacity),
            limit: codec::to_u64(max_ids),
        });
    }
    let live_count = codec::get_u64(bytes, &mut pos)?;
    if live_count > codec::to_u64(capacity) {
        return Err(CodecError::Corrupt(format!(
            "{live_count} live nodes exceed id capacity {capacity}"
        )));
    }
    // Every record is at least this long; reject absurd headers before
    // allocating the id space.
    let min_record = 8 + 1 + 8 + 4;
    let remaining = codec::to_u64(bytes.len() - pos);
    if live_count.saturating_mul(min_record) > remaining {
        return Err(CodecError::UnexpectedEof {
            offset: pos,
            needed: codec::to_usize(live_count.saturating_mul(min_record))?,
            available: bytes.len() - pos,
        });
    }

    let mut graph =
        Graph::with_tombstones(capacity).map_err(|_| CodecError::Overflow(codec::to_u64(capacity)))?;
    let mut previous: Option<NodeId> = None;
    for _ in 0..live_count {
        let id = NodeId::new(codec::to_usize(codec::get_u64(bytes, &mut pos)?)?);
        if previous.is_some_and(|p| p >= id) {
            return Err(CodecError::Corrupt(format!(
                "node record {id} out of ascending order"
            )));
        }
        previous = Some(id);

        expect_kind::<A>(codec::get_u8(bytes, &mut pos)?)?;
        let declared = codec::get_u64(bytes, &mut pos)?;
        let attribute = codec::decode_attribute::<A>(bytes, &mut pos, declared)?;

        let degree = codec::get_u32(bytes, &mut pos)?;
        let byte_len = u64::from(degree) * 12;
        if byte_len > codec::to_u64(bytes.len() - pos) {
            return Err(CodecError::UnexpectedEof {
                offset: pos,
                needed: codec::to_usize(byte_len)?,
                available: bytes.len() - pos,
            });
        }
        let mut edges = Vec::with_capacity(codec::to_usize(u64::from(degree))?);
        for _ in 0..degree {
            let neighbor = NodeId::new(codec::to_usize(codec::get_u64(bytes, &mut pos)?)?);
            let boundary = codec::get_u32(bytes, &mut pos)?;
            edges.push((neighbor, Edge::new(boundary)));
        }

        graph.revive(id, attribute, edges)?;
    }

    if pos != bytes.len() {
        return Err(CodecError::TrailingBytes(bytes.len() - pos));
    }
    graph.check_invariants()?;
    trace!("read graph: {} live nodes", graph.live_count());
    Ok(graph)
}

fn expect_kind<A: Attribute>(tag: u8) -> Result<(), CodecError> {
    let found = AttributeKind::try_from(tag)?;
    if found == A::KIND {
        Ok(())
    } else {
        Err(CodecError::AttributeKindMismatch {
            expected: A::KIND,
            found,
        })
    }
}
