//! Byte-stream primitives shared by the attribute codec and the graph
//! file framing.
//!
//! Every multi-byte integer is little-endian. Writers append to a
//! `Vec<u8>` (the write cursor is the vector's length); readers take a
//! `&[u8]` plus a `position` cursor that is advanced by exactly the
//! number of bytes consumed. Reads never go past the end of the slice:
//! a short stream is reported as [`CodecError::UnexpectedEof`].

use crate::attribute::{Attribute, AttributeKind};
use crate::types::GraphError;

/// Errors raised while encoding or decoding graph data.
///
/// All variants except [`Graph`](Self::Graph) are corruption-class: the
/// bytes on hand do not describe a valid record and must not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The stream ended before a value could be read.
    #[error("unexpected end of stream at offset {offset}: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        /// Cursor position of the failed read.
        offset: usize,
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the stream.
        available: usize,
    },

    /// Declared and actual encoded sizes disagree.
    #[error("length mismatch: declared {declared} bytes, got {actual}")]
    LengthMismatch {
        /// Size announced by `serialized_size` or the record header.
        declared: u64,
        /// Bytes actually produced or consumed.
        actual: u64,
    },

    /// The stream does not start with the graph file magic.
    #[error("bad magic {0:?}")]
    BadMagic([u8; 4]),

    /// The graph file was written by an incompatible version.
    #[error("unsupported graph file version {0}")]
    UnsupportedVersion(u16),

    /// The attribute tag does not name any known attribute kind.
    #[error("unknown attribute kind tag {0}")]
    UnknownAttributeKind(u8),

    /// The attribute tag names a kind other than the one being decoded.
    #[error("attribute kind mismatch: expected {expected:?}, found {found:?}")]
    AttributeKindMismatch {
        /// Kind the reader was asked to decode.
        expected: AttributeKind,
        /// Kind recorded in the stream.
        found: AttributeKind,
    },

    /// A length or id does not fit in memory on this platform.
    #[error("value {0} exceeds addressable size")]
    Overflow(u64),

    /// The header claims more node ids than the reader allows.
    #[error("id capacity {capacity} exceeds the limit of {limit}")]
    CapacityLimit {
        /// Id capacity recorded in the header.
        capacity: u64,
        /// Largest capacity the reader accepts.
        limit: u64,
    },

    /// Bytes remain after the last record.
    #[error("{0} trailing bytes after last record")]
    TrailingBytes(usize),

    /// The payload decoded but violates a value invariant.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The decoded adjacency violates a graph invariant.
    #[error("invalid graph structure: {0}")]
    Graph(#[from] GraphError),
}

/// Convert an on-wire length to `usize`.
///
/// # Errors
///
/// Returns [`CodecError::Overflow`] if `value` does not fit.
pub fn to_usize(value: u64) -> Result<usize, CodecError> {
    usize::try_from(value).map_err(|_| CodecError::Overflow(value))
}

/// Convert an in-memory length to its on-wire `u64` form.
#[must_use]
pub fn to_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

/// Append one byte.
pub fn put_u8(stream: &mut Vec<u8>, value: u8) {
    stream.push(value);
}

/// Append a little-endian `u16`.
pub fn put_u16(stream: &mut Vec<u8>, value: u16) {
    stream.extend_from_slice(&value.to_le_bytes());
}

/// Append a little-endian `u32`.
pub fn put_u32(stream: &mut Vec<u8>, value: u32) {
    stream.extend_from_slice(&value.to_le_bytes());
}

/// Append a little-endian `u64`.
pub fn put_u64(stream: &mut Vec<u8>, value: u64) {
    stream.extend_from_slice(&value.to_le_bytes());
}

/// Borrow the next `len` bytes and advance `position` past them.
///
/// # Errors
///
/// Returns [`CodecError::UnexpectedEof`] if fewer than `len` bytes
/// remain; `position` is left unchanged in that case.
pub fn take<'a>(stream: &'a [u8], position: &mut usize, len: usize) -> Result<&'a [u8], CodecError> {
    let available = stream.len().saturating_sub(*position);
    if len > available {
        return Err(CodecError::UnexpectedEof {
            offset: *position,
            needed: len,
            available,
        });
    }
    let bytes = &stream[*position..*position + len];
    *position += len;
    Ok(bytes)
}

fn take_array<const N: usize>(stream: &[u8], position: &mut usize) -> Result<[u8; N], CodecError> {
    let mut out = [0u8; N];
    out.copy_from_slice(take(stream, position, N)?);
    Ok(out)
}

/// Read one byte.
///
/// # Errors
///
/// Returns [`CodecError::UnexpectedEof`] on a short stream.
pub fn get_u8(stream: &[u8], position: &mut usize) -> Result<u8, CodecError> {
    Ok(take_array::<1>(stream, position)?[0])
}

/// Read a little-endian `u16`.
///
/// # Errors
///
/// Returns [`CodecError::UnexpectedEof`] on a short stream.
pub fn get_u16(stream: &[u8], position: &mut usize) -> Result<u16, CodecError> {
    take_array(stream, position).map(u16::from_le_bytes)
}

/// Read a little-endian `u32`.
///
/// # Errors
///
/// Returns [`CodecError::UnexpectedEof`] on a short stream.
pub fn get_u32(stream: &[u8], position: &mut usize) -> Result<u32, CodecError> {
    take_array(stream, position).map(u32::from_le_bytes)
}

/// Read a little-endian `u64`.
///
/// # Errors
///
/// Returns [`CodecError::UnexpectedEof`] on a short stream.
pub fn get_u64(stream: &[u8], position: &mut usize) -> Result<u64, CodecError> {
    take_array(stream, position).map(u64::from_le_bytes)
}

/// Serialize `attribute`, checking that exactly
/// [`serialized_size`](Attribute::serialized_size) bytes were appended.
///
/// # Errors
///
/// Returns [`CodecError::LengthMismatch`] if the serializer and its size
/// estimate disagree. The partial output is removed from `stream`.
pub fn encode_attribute<A: Attribute>(attribute: &A, stream: &mut Vec<u8>) -> Result<(), CodecError> {
    let start = stream.len();
    attribute.serialize(stream);
    let written = to_u64(stream.len() - start);
    let declared = attribute.serialized_size();
    if written != declared {
        stream.truncate(start);
        return Err(CodecError::LengthMismatch {
            declared,
            actual: written,
        });
    }
    Ok(())
}

/// Deserialize an attribute whose record declares `declared` payload
/// bytes, checking that exactly that many bytes were consumed.
///
/// The deserializer only sees the declared payload, so a malformed
/// attribute can never read into the following record.
///
/// # Errors
///
/// Returns [`CodecError::UnexpectedEof`] if the stream is shorter than
/// the declared payload, [`CodecError::LengthMismatch`] if the
/// deserializer consumed a different number of bytes, or whatever the
/// attribute's own decoder reports.
pub fn decode_attribute<A: Attribute>(
    stream: &[u8],
    position: &mut usize,
    declared: u64,
) -> Result<A, CodecError> {
    let payload = take(stream, position, to_usize(declared)?)?;
    let mut cursor = 0;
    let attribute = A::deserialize(payload, &mut cursor)?;
    if cursor != payload.len() || attribute.serialized_size() != declared {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: to_u64(cursor),
        });
    }
    Ok(attribute)
}
