//! Run configuration.
//!
//! Every parameter has a default exposed as a `DEFAULT_*` constant so the
//! CLI and the library cannot drift apart. [`SchedulerConfig::validate`]
//! is called by [`run`](crate::run) before anything touches the
//! filesystem.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use segraph_export::DEFAULT_FIELD_NAME;
use segraph_graph::Connectivity;

use crate::error::SchedulerError;

/// Mean-shift kernel parameters, handed to the [`Segmenter`](crate::Segmenter).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanShiftParams {
    /// Spatial radius of the kernel in pixels.
    pub spatial_bandwidth: u32,
    /// Spectral radius of the kernel.
    pub spectral_bandwidth: f32,
    /// Mode convergence threshold.
    pub threshold: f32,
    /// Spectral radius growth per unit of intensity.
    pub spectral_ramp: f32,
    /// Whether to shortcut pixels whose trajectory crosses a known mode.
    pub mode_search: bool,
}

impl MeanShiftParams {
    /// Default spatial bandwidth.
    pub const DEFAULT_SPATIAL_BANDWIDTH: u32 = 5;
    /// Default spectral bandwidth.
    pub const DEFAULT_SPECTRAL_BANDWIDTH: f32 = 15.0;
    /// Default convergence threshold.
    pub const DEFAULT_THRESHOLD: f32 = 0.1;
    /// Default spectral ramp.
    pub const DEFAULT_SPECTRAL_RAMP: f32 = 0.0;
    /// Default mode-search flag.
    pub const DEFAULT_MODE_SEARCH: bool = false;

    fn validate(&self) -> Result<(), SchedulerError> {
        if self.spatial_bandwidth == 0 {
            return invalid("spatial bandwidth must be at least 1");
        }
        if !(self.spectral_bandwidth.is_finite() && self.spectral_bandwidth > 0.0) {
            return invalid("spectral bandwidth must be a positive number");
        }
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return invalid("threshold must be a non-negative number");
        }
        if !(self.spectral_ramp.is_finite() && self.spectral_ramp >= 0.0) {
            return invalid("spectral ramp must be a non-negative number");
        }
        Ok(())
    }
}

impl Default for MeanShiftParams {
    fn default() -> Self {
        Self {
            spatial_bandwidth: Self::DEFAULT_SPATIAL_BANDWIDTH,
            spectral_bandwidth: Self::DEFAULT_SPECTRAL_BANDWIDTH,
            threshold: Self::DEFAULT_THRESHOLD,
            spectral_ramp: Self::DEFAULT_SPECTRAL_RAMP,
            mode_search: Self::DEFAULT_MODE_SEARCH,
        }
    }
}

/// What to write and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory; must already exist.
    pub directory: PathBuf,
    /// File name of the label image (format chosen by extension).
    pub label_image_name: String,
    /// File name of the persisted graph.
    pub graph_name: String,
    /// File name of the GeoJSON export, if wanted.
    pub vector_name: Option<String>,
    /// Whether to write the label image.
    pub write_label_image: bool,
    /// Whether to write the graph file.
    pub write_graph: bool,
    /// Property name carrying the label in the vector export.
    pub field_name: String,
    /// Trace vector outlines 8-connected.
    pub use_8_connected: bool,
}

impl OutputConfig {
    /// Default graph file name.
    pub const DEFAULT_GRAPH_NAME: &'static str = "graph.sgrf";
    /// Default label image name.
    pub const DEFAULT_LABEL_IMAGE_NAME: &'static str = "labels.png";

    fn validate(&self) -> Result<(), SchedulerError> {
        if self.write_label_image {
            check_file_name("label image name", &self.label_image_name)?;
        }
        if self.write_graph {
            check_file_name("graph name", &self.graph_name)?;
        }
        if let Some(name) = &self.vector_name {
            check_file_name("vector name", name)?;
            if self.field_name.is_empty() {
                return invalid("vector field name must not be empty");
            }
        }
        Ok(())
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            label_image_name: Self::DEFAULT_LABEL_IMAGE_NAME.to_owned(),
            graph_name: Self::DEFAULT_GRAPH_NAME.to_owned(),
            vector_name: None,
            write_label_image: true,
            write_graph: true,
            field_name: DEFAULT_FIELD_NAME.to_owned(),
            use_8_connected: false,
        }
    }
}

/// Full configuration of one scheduler run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Source raster.
    pub input: PathBuf,
    /// Maximum tile width in pixels.
    pub tile_width: u32,
    /// Maximum tile height in pixels.
    pub tile_height: u32,
    /// Memory budget in megabytes (advisory).
    pub memory_budget_mb: u64,
    /// Directory for spilled tile graphs.
    pub scratch_dir: PathBuf,
    /// Cap on contraction passes over the stitched graph.
    pub max_iterations: usize,
    /// Kernel parameters for the segmenter.
    pub mean_shift: MeanShiftParams,
    /// Pixel adjacency used to build graphs.
    pub connectivity: Connectivity,
    /// Number of worker threads.
    pub workers: usize,
    /// Output selection.
    pub output: OutputConfig,
}

impl SchedulerConfig {
    /// Default maximum tile edge length.
    pub const DEFAULT_TILE_SIZE: u32 = 512;
    /// Default memory budget.
    pub const DEFAULT_MEMORY_BUDGET_MB: u64 = 256;
    /// Default stitch iteration cap.
    pub const DEFAULT_MAX_ITERATIONS: usize = 64;
    /// Default worker count.
    pub const DEFAULT_WORKERS: usize = 1;

    /// The memory budget in bytes.
    #[must_use]
    pub const fn memory_budget_bytes(&self) -> u64 {
        self.memory_budget_mb.saturating_mul(1024 * 1024)
    }

    /// Check every parameter without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] naming the first bad
    /// parameter.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.input.as_os_str().is_empty() {
            return invalid("input path must not be empty");
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return invalid("tile width and height must be at least 1");
        }
        if self.memory_budget_mb == 0 {
            return invalid("memory budget must be at least 1 MB");
        }
        if self.scratch_dir.as_os_str().is_empty() {
            return invalid("scratch directory must not be empty");
        }
        if self.max_iterations == 0 {
            return invalid("maximum iterations must be at least 1");
        }
        if self.workers == 0 {
            return invalid("worker count must be at least 1");
        }
        self.mean_shift.validate()?;
        self.output.validate()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            tile_width: Self::DEFAULT_TILE_SIZE,
            tile_height: Self::DEFAULT_TILE_SIZE,
            memory_budget_mb: Self::DEFAULT_MEMORY_BUDGET_MB,
            scratch_dir: std::env::temp_dir(),
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            mean_shift: MeanShiftParams::default(),
            connectivity: Connectivity::default(),
            workers: Self::DEFAULT_WORKERS,
            output: OutputConfig::default(),
        }
    }
}

fn invalid(message: &str) -> Result<(), SchedulerError> {
    Err(SchedulerError::InvalidConfig(message.to_owned()))
}

/// A bare file name: non-empty, no directory components.
fn check_file_name(what: &str, name: &str) -> Result<(), SchedulerError> {
    let path = std::path::Path::new(name);
    if name.is_empty() || path.file_name().is_none_or(|f| f != path.as_os_str()) {
        return Err(SchedulerError::InvalidConfig(format!(
            "{what} must be a plain file name, got {name:?}"
        )));
    }
    Ok(())
}
