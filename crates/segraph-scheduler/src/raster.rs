//! Raster input and label image output.
//!
//! Input rasters are decoded with the `image` crate and reduced to one
//! 16-bit luminance band, widened to [`Label`](segraph_graph::Label). The
//! label image written after a run stores a dense region index per pixel
//! (1-based, in ascending node-id order). Indices up to `u16::MAX` are
//! written as 16-bit grayscale; wider indices are packed little-endian
//! into the four channels of an 8-bit RGBA image.

use std::path::Path;

use image::{DynamicImage, ImageBuffer, Luma, Rgba, RgbaImage};
use log::{info, warn};

use segraph_graph::{Dimensions, LabelGraph, LabelImage};

use crate::error::SchedulerError;

/// Single-band image holding 32-bit region indices.
pub type RegionIndexImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Read and decode the raster at `path`.
///
/// # Errors
///
/// Returns [`SchedulerError::Io`] naming `path` if it cannot be read,
/// and [`SchedulerError::ImageDecode`] if its format is unrecognised.
pub fn read_raster(path: &Path) -> Result<LabelImage, SchedulerError> {
    let decoded = decode(path)?;
    let luma = decoded.into_luma16();
    Ok(LabelImage::from_fn(luma.width(), luma.height(), |x, y| {
        Luma([u32::from(luma.get_pixel(x, y).0[0])])
    }))
}

/// Read a label image written by [`write_region_index_image`].
///
/// RGBA images are unpacked to 32-bit indices; anything else is read as
/// 16-bit grayscale.
///
/// # Errors
///
/// Same as [`read_raster`].
pub fn read_region_index_image(path: &Path) -> Result<RegionIndexImage, SchedulerError> {
    match decode(path)? {
        DynamicImage::ImageRgba8(packed) => Ok(RegionIndexImage::from_fn(
            packed.width(),
            packed.height(),
            |x, y| Luma([u32::from_le_bytes(packed.get_pixel(x, y).0)]),
        )),
        other => {
            let luma = other.into_luma16();
            Ok(RegionIndexImage::from_fn(luma.width(), luma.height(), |x, y| {
                Luma([u32::from(luma.get_pixel(x, y).0[0])])
            }))
        }
    }
}

fn decode(path: &Path) -> Result<DynamicImage, SchedulerError> {
    let bytes = std::fs::read(path).map_err(|e| SchedulerError::io(path, e))?;
    let decoded = image::load_from_memory(&bytes).map_err(|source| SchedulerError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        "read {}: {}x{} ({} bytes)",
        path.display(),
        decoded.width(),
        decoded.height(),
        bytes.len()
    );
    Ok(decoded)
}

/// Paint every region of `graph` with its 1-based index.
///
/// # Errors
///
/// Returns [`SchedulerError::TooManyRegions`] if the graph has more than
/// `u32::MAX` live nodes and [`SchedulerError::PixelOutOfRaster`] if a
/// node holds a pixel outside `dimensions`.
pub fn region_index_image(
    graph: &LabelGraph,
    dimensions: Dimensions,
) -> Result<RegionIndexImage, SchedulerError> {
    if u32::try_from(graph.live_count()).is_err() {
        return Err(SchedulerError::TooManyRegions(graph.live_count()));
    }
    let mut image = RegionIndexImage::new(dimensions.width, dimensions.height);
    for (index, node) in (1..=u32::MAX).zip(graph.nodes()) {
        for &coord in node.attribute().pixels() {
            let (x, y) = dimensions
                .position(coord)
                .ok_or(SchedulerError::PixelOutOfRaster(coord))?;
            image.put_pixel(x, y, Luma([index]));
        }
    }
    Ok(image)
}

/// Write `image` to `path`, choosing the format from its extension.
///
/// # Errors
///
/// Returns [`SchedulerError::ImageEncode`] if the format is unknown or
/// cannot hold the encoding, or the file cannot be written.
pub fn write_region_index_image(image: &RegionIndexImage, path: &Path) -> Result<(), SchedulerError> {
    let widest = image.pixels().map(|p| p.0[0]).max().unwrap_or(0);
    let saved = match u16::try_from(widest) {
        Ok(_) => ImageBuffer::<Luma<u16>, Vec<u16>>::from_fn(image.width(), image.height(), |x, y| {
            Luma([u16::try_from(image.get_pixel(x, y).0[0]).unwrap_or(u16::MAX)])
        })
        .save(path),
        Err(_) => {
            warn!(
                "{}: region index {widest} exceeds 16 bits, writing packed RGBA",
                path.display()
            );
            RgbaImage::from_fn(image.width(), image.height(), |x, y| {
                Rgba(image.get_pixel(x, y).0[0].to_le_bytes())
            })
            .save(path)
        }
    };
    saved.map_err(|source| SchedulerError::ImageEncode {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use segraph_graph::{Connectivity, LabelNodeAttribute, label_image_to_graph};

    #[test]
    fn missing_raster_names_path() {
        let path = Path::new("/definitely/not/here.png");
        let err = read_raster(path).unwrap_err();
        assert!(matches!(err, SchedulerError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.png"));
    }

    #[test]
    fn undecodable_raster_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.png");
        std::fs::write(&path, b"not an image").unwrap();
        let err = read_raster(&path).unwrap_err();
        assert!(matches!(err, SchedulerError::ImageDecode { .. }));
    }

    #[test]
    fn sixteen_bit_png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.png");
        let source = RegionIndexImage::from_fn(4, 3, |x, y| Luma([x * 1000 + y]));
        write_region_index_image(&source, &path).unwrap();

        let raster = read_raster(&path).unwrap();
        assert_eq!(raster.dimensions(), (4, 3));
        assert_eq!(raster.get_pixel(3, 2).0[0], 3002);
        assert_eq!(read_region_index_image(&path).unwrap(), source);
    }

    #[test]
    fn wide_indices_are_packed_losslessly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.png");
        let mut source = RegionIndexImage::from_fn(3, 2, |x, y| Luma([70_000 + x + 1_000_000 * y]));
        source.put_pixel(0, 0, Luma([u32::MAX]));
        source.put_pixel(1, 0, Luma([1]));
        write_region_index_image(&source, &path).unwrap();

        assert!(matches!(
            image::open(&path).unwrap(),
            DynamicImage::ImageRgba8(_)
        ));
        assert_eq!(read_region_index_image(&path).unwrap(), source);
    }

    #[test]
    fn region_indices_follow_node_order() {
        let image = LabelImage::from_raw(3, 1, vec![9, 9, 4]).unwrap();
        let graph = label_image_to_graph(&image, Connectivity::Four).unwrap();
        let dims = Dimensions { width: 3, height: 1 };
        let indexed = region_index_image(&graph, dims).unwrap();
        // The first live node (lowest id) gets index 1.
        let first = graph.nodes().next().unwrap();
        let (x, y) = dims.position(first.attribute().pixels()[0]).unwrap();
        assert_eq!(indexed.get_pixel(x, y).0[0], 1);
        let mut values: Vec<u32> = indexed.pixels().map(|p| p.0[0]).collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn out_of_raster_pixel_is_rejected() {
        let mut graph = LabelGraph::new();
        graph.add_node(LabelNodeAttribute::single(1, 100));
        let err = region_index_image(&graph, Dimensions { width: 2, height: 2 }).unwrap_err();
        assert!(matches!(err, SchedulerError::PixelOutOfRaster(100)));
    }
}
