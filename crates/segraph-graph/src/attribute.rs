//! Node payloads: the [`Attribute`] contract and [`LabelNodeAttribute`].
//!
//! An attribute is the data a graph node owns. Besides the merge rule
//! ([`Attribute::absorb`]) every attribute provides two size measures:
//!
//! - [`memory_size`](Attribute::memory_size): advisory heap footprint,
//!   used by the tile scheduler to size tiles under a memory budget.
//! - [`serialized_size`](Attribute::serialized_size): the exact number
//!   of bytes [`serialize`](Attribute::serialize) appends. The checked
//!   wrappers in [`crate::codec`] treat any disagreement as corruption.
//!
//! Attribute kinds form a closed set ([`AttributeKind`]); the kind tag is
//! written ahead of every persisted payload so readers can reject files
//! holding a different payload type.

use std::mem::size_of;

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError};
use crate::types::{Coord, Label};

/// Width of a serialized [`Label`] in bytes.
pub const LABEL_WIDTH: u64 = size_of::<Label>() as u64;

/// Width of a serialized [`Coord`] in bytes.
pub const COORD_WIDTH: u64 = size_of::<Coord>() as u64;

/// Width of the pixel-count prefix in bytes.
pub const LENGTH_PREFIX_WIDTH: u64 = size_of::<u64>() as u64;

/// Every attribute kind that can be persisted or exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttributeKind {
    /// [`LabelNodeAttribute`].
    Label = 1,
}

impl AttributeKind {
    /// The on-wire tag byte.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for AttributeKind {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::Label),
            other => Err(CodecError::UnknownAttributeKind(other)),
        }
    }
}

/// Contract every node payload satisfies.
///
/// Round-trip law: for any value `a`, serializing then deserializing
/// yields a value equal to `a`, and the deserializer consumes exactly
/// `a.serialized_size()` bytes.
pub trait Attribute: Default {
    /// Tag written ahead of the payload.
    const KIND: AttributeKind;

    /// Estimated heap footprint in bytes.
    fn memory_size(&self) -> u64;

    /// Exact number of bytes [`serialize`](Self::serialize) appends.
    fn serialized_size(&self) -> u64;

    /// Append the encoded payload to `stream`.
    fn serialize(&self, stream: &mut Vec<u8>);

    /// Decode a payload starting at `position`, advancing it past the
    /// bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the stream is short or the payload
    /// violates the attribute's value invariants.
    fn deserialize(stream: &[u8], position: &mut usize) -> Result<Self, CodecError>;

    /// Fold `other` into `self` when its node is merged into this one.
    fn absorb(&mut self, other: Self);
}

/// Payload of a label-region node: a label and the pixels it covers.
///
/// The pixel list is kept strictly ascending, so two regions with the
/// same membership always compare equal regardless of merge order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelNodeAttribute {
    label: Label,
    pixels: Vec<Coord>,
}

impl LabelNodeAttribute {
    /// Create an attribute; `pixels` are sorted and deduplicated.
    #[must_use]
    pub fn new(label: Label, mut pixels: Vec<Coord>) -> Self {
        pixels.sort_unstable();
        pixels.dedup();
        Self { label, pixels }
    }

    /// Attribute of a single-pixel node.
    #[must_use]
    pub fn single(label: Label, pixel: Coord) -> Self {
        Self {
            label,
            pixels: vec![pixel],
        }
    }

    /// The region label.
    #[must_use]
    pub const fn label(&self) -> Label {
        self.label
    }

    /// Member pixels in ascending linear order.
    #[must_use]
    pub fn pixels(&self) -> &[Coord] {
        &self.pixels
    }

    /// Number of member pixels.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    /// Consume the attribute, returning its pixel list.
    #[must_use]
    pub fn into_pixels(self) -> Vec<Coord> {
        self.pixels
    }

    /// [`memory_size`](Attribute::memory_size) of a one-pixel node, the
    /// unit the tile planner budgets with.
    #[must_use]
    pub const fn single_pixel_memory_size() -> u64 {
        Self::FIXED_OVERHEAD + COORD_WIDTH
    }

    const FIXED_OVERHEAD: u64 = (size_of::<Label>() + size_of::<Vec<Coord>>()) as u64;
}

impl Attribute for LabelNodeAttribute {
    const KIND: AttributeKind = AttributeKind::Label;

    fn memory_size(&self) -> u64 {
        Self::FIXED_OVERHEAD + COORD_WIDTH * codec::to_u64(self.pixels.len())
    }

    fn serialized_size(&self) -> u64 {
        LABEL_WIDTH + LENGTH_PREFIX_WIDTH + COORD_WIDTH * codec::to_u64(self.pixels.len())
    }

    fn serialize(&self, stream: &mut Vec<u8>) {
        codec::put_u32(stream, self.label);
        codec::put_u64(stream, codec::to_u64(self.pixels.len()));
        for &pixel in &self.pixels {
            codec::put_u64(stream, pixel);
        }
    }

    fn deserialize(stream: &[u8], position: &mut usize) -> Result<Self, CodecError> {
        let label = codec::get_u32(stream, position)?;
        let count = codec::get_u64(stream, position)?;
        // Check the whole list is present before allocating for it.
        let byte_len = count
            .checked_mul(COORD_WIDTH)
            .ok_or(CodecError::Overflow(count))?;
        let bytes = codec::take(stream, position, codec::to_usize(byte_len)?)?;

        let mut pixels = Vec::with_capacity(codec::to_usize(count)?);
        let mut cursor = 0;
        while cursor < bytes.len() {
            let pixel = codec::get_u64(bytes, &mut cursor)?;
            if pixels.last().is_some_and(|&last| last >= pixel) {
                return Err(CodecError::Corrupt(format!(
                    "pixel list not strictly ascending at coordinate {pixel}"
                )));
            }
            pixels.push(pixel);
        }
        Ok(Self { label, pixels })
    }

    /// Merge the pixel lists; the label of `other` is discarded.
    ///
    /// The smaller list is folded into the larger one, so a region that
    /// grows by absorbing single pixels in scan order only ever appends.
    fn absorb(&mut self, other: Self) {
        let mut theirs = other.pixels;
        if theirs.len() > self.pixels.len() {
            std::mem::swap(&mut self.pixels, &mut theirs);
        }
        if theirs.is_empty() {
            return;
        }
        if self.pixels.last() < theirs.first() {
            self.pixels.extend(theirs);
            return;
        }
        if theirs.last() < self.pixels.first() {
            self.pixels.splice(0..0, theirs);
            return;
        }

        let ours = std::mem::take(&mut self.pixels);
        let mut merged = Vec::with_capacity(ours.len() + theirs.len());
        let mut a = ours.into_iter().peekable();
        let mut b = theirs.into_iter().peekable();
        loop {
            let next = match (a.peek(), b.peek()) {
                (Some(x), Some(y)) if x < y => a.next(),
                (Some(x), Some(y)) if x > y => b.next(),
                (Some(_), Some(_)) => {
                    b.next();
                    a.next()
                }
                (Some(_), None) => a.next(),
                (None, Some(_)) => b.next(),
                (None, None) => break,
            };
            merged.extend(next);
        }
        self.pixels = merged;
    }
}
