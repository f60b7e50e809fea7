//! Tile segmentation strategies.
//!
//! A [`Segmenter`] turns a tile of the source raster into a label tile.
//! Numeric mean-shift clustering is not implemented here; callers plug in
//! their own segmenter or use [`PrelabelledSegmenter`] for rasters whose
//! pixel values already are region labels.

use segraph_graph::LabelImage;

use crate::config::MeanShiftParams;
use crate::error::SchedulerError;

/// Produces a label tile from a raster tile.
///
/// Implementations run on worker threads, one tile at a time, and must
/// return a tile of the same dimensions. Labels must mean the same thing
/// in every tile so regions can be joined across tile borders.
pub trait Segmenter: Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Label `tile` using the kernel `params`.
    ///
    /// # Errors
    ///
    /// Implementation-defined; any error is fatal for the tile.
    fn segment(&self, tile: LabelImage, params: &MeanShiftParams) -> Result<LabelImage, SchedulerError>;
}

/// Passes pixel values through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrelabelledSegmenter;

impl Segmenter for PrelabelledSegmenter {
    fn name(&self) -> &'static str {
        "prelabelled"
    }

    fn segment(&self, tile: LabelImage, _params: &MeanShiftParams) -> Result<LabelImage, SchedulerError> {
        Ok(tile)
    }
}
