//! Scheduler error type.

use std::path::PathBuf;

use segraph_export::ExportError;
use segraph_graph::{CodecError, Coord, GraphError};

/// Errors that abort a scheduler run.
///
/// Every variant is job-fatal: the run stops, and nothing further is
/// written to the output directory.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A file or directory could not be read, written or created.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The input raster could not be decoded.
    #[error("failed to decode raster {}: {source}", path.display())]
    ImageDecode {
        /// The raster path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: image::ImageError,
    },

    /// The label image could not be encoded.
    #[error("failed to write label image {}: {source}", path.display())]
    ImageEncode {
        /// The output path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: image::ImageError,
    },

    /// The configuration was rejected before any processing.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// Even a single-pixel tile does not fit the memory budget.
    #[error("memory budget of {budget} bytes cannot hold a single pixel ({needed} bytes)")]
    MemoryBudgetExceeded {
        /// Estimated bytes for one pixel.
        needed: u64,
        /// Configured budget in bytes.
        budget: u64,
    },

    /// The regions exchanged between tiles outgrew the memory budget.
    #[error("stitching needs {needed} bytes but only {budget} bytes of the memory budget are free")]
    StitchOverBudget {
        /// Estimated bytes of the exchange graph and its border index.
        needed: u64,
        /// Bytes of budget left after resident tile payloads.
        budget: u64,
    },

    /// A tile graph payload is corrupt.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A graph operation broke a structural invariant.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Vector export failed.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Processing a tile failed.
    #[error("tile ({row}, {col}) failed: {source}")]
    Tile {
        /// Tile row.
        row: u32,
        /// Tile column.
        col: u32,
        /// What went wrong.
        #[source]
        source: Box<Self>,
    },

    /// A segmenter returned a tile of the wrong size.
    #[error("segmenter returned a {found:?} tile for a {expected:?} input")]
    SegmentedTileMismatch {
        /// Input tile size `(width, height)`.
        expected: (u32, u32),
        /// Returned tile size.
        found: (u32, u32),
    },

    /// A worker thread panicked.
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    /// A graph references a pixel outside the raster.
    #[error("pixel {0} lies outside the raster")]
    PixelOutOfRaster(Coord),

    /// The label image can index at most `u32::MAX` regions.
    #[error("{0} regions do not fit a 32-bit label image")]
    TooManyRegions(usize),
}

impl SchedulerError {
    /// Wrap an [`std::io::Error`] with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_path() {
        let err = SchedulerError::io(
            "/no/such/raster.png",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(err.to_string().contains("/no/such/raster.png"));
    }

    #[test]
    fn tile_error_names_tile_and_cause() {
        let err = SchedulerError::Tile {
            row: 2,
            col: 5,
            source: Box::new(SchedulerError::TooManyRegions(70_000)),
        };
        let message = err.to_string();
        assert!(message.contains("(2, 5)"));
        assert!(message.contains("70000"));
    }
}
