//! In-memory store for finished tile graphs that spills to disk.
//!
//! Serialized tile graphs are held in memory while their total size
//! stays within the budget. A tile that would push the total over is
//! written to `<scratch>/tile-<row>-<col>.sgrf` instead and read back
//! when the stitcher asks for it. Reloaded graphs may not claim more node
//! ids than their tile has pixels. A scratch directory created by the
//! store is removed again on cleanup.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use segraph_graph::{LabelGraph, read_graph_bounded};

use crate::error::SchedulerError;
use crate::tiling::Tile;

#[derive(Debug)]
enum Slot {
    Resident(Vec<u8>),
    Spilled(PathBuf),
}

/// Serialized tile graphs keyed by `(row, col)`.
#[derive(Debug)]
pub struct TileStore {
    budget: u64,
    resident_bytes: u64,
    scratch: PathBuf,
    scratch_ready: bool,
    owns_scratch: bool,
    /// Each slot with the id limit of its tile.
    slots: BTreeMap<(u32, u32), (Slot, usize)>,
}

impl TileStore {
    /// Keep up to `budget` bytes of payload resident; spill the rest into
    /// `scratch`, created on first use.
    #[must_use]
    pub fn new(budget: u64, scratch: impl Into<PathBuf>) -> Self {
        Self {
            budget,
            resident_bytes: 0,
            scratch: scratch.into(),
            scratch_ready: false,
            owns_scratch: false,
            slots: BTreeMap::new(),
        }
    }

    /// Store the payload of `tile`. Returns whether it was spilled.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Io`] if the scratch directory or the
    /// spill file cannot be written.
    pub fn insert(&mut self, tile: Tile, payload: Vec<u8>) -> Result<bool, SchedulerError> {
        let len = payload.len() as u64;
        let slot = if self.resident_bytes.saturating_add(len) <= self.budget {
            self.resident_bytes += len;
            Slot::Resident(payload)
        } else {
            if !self.scratch_ready {
                self.owns_scratch = !self.scratch.exists();
                fs::create_dir_all(&self.scratch).map_err(|e| SchedulerError::io(&self.scratch, e))?;
                self.scratch_ready = true;
            }
            let path = self.spill_path(tile);
            fs::write(&path, &payload).map_err(|e| SchedulerError::io(&path, e))?;
            debug!("spilled tile ({}, {}) to {} ({len} bytes)", tile.row, tile.col, path.display());
            Slot::Spilled(path)
        };
        let spilled = matches!(slot, Slot::Spilled(_));
        let max_ids = usize::try_from(tile.pixel_count()).unwrap_or(usize::MAX);
        self.slots.insert((tile.row, tile.col), (slot, max_ids));
        Ok(spilled)
    }

    /// Decode the graph stored for `(row, col)`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Io`] if a spill file cannot be read and
    /// [`SchedulerError::Codec`] if the payload is corrupt or claims more
    /// node ids than the tile has pixels.
    pub fn load(&self, row: u32, col: u32) -> Result<Option<LabelGraph>, SchedulerError> {
        let graph = match self.slots.get(&(row, col)) {
            None => return Ok(None),
            Some((Slot::Resident(bytes), max_ids)) => read_graph_bounded(bytes, *max_ids)?,
            Some((Slot::Spilled(path), max_ids)) => {
                let bytes = fs::read(path).map_err(|e| SchedulerError::io(path, e))?;
                read_graph_bounded(&bytes, *max_ids)?
            }
        };
        Ok(Some(graph))
    }

    /// Number of stored tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no tile is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of tiles on disk.
    #[must_use]
    pub fn spilled(&self) -> usize {
        self.slots
            .values()
            .filter(|(slot, _)| matches!(slot, Slot::Spilled(_)))
            .count()
    }

    /// Payload bytes held in memory.
    #[must_use]
    pub const fn resident_bytes(&self) -> u64 {
        self.resident_bytes
    }

    /// Delete every spill file. Failures are logged, not returned.
    pub fn cleanup(&mut self) {
        for (slot, _) in self.slots.values() {
            if let Slot::Spilled(path) = slot
                && let Err(e) = fs::remove_file(path)
            {
                warn!("could not remove spill file {}: {e}", path.display());
            }
        }
        self.slots.clear();
        self.resident_bytes = 0;
        if self.owns_scratch {
            if let Err(e) = fs::remove_dir(&self.scratch) {
                warn!("could not remove scratch directory {}: {e}", self.scratch.display());
            }
            self.owns_scratch = false;
            self.scratch_ready = false;
        }
    }

    /// The scratch directory.
    #[must_use]
    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    fn spill_path(&self, tile: Tile) -> PathBuf {
        self.scratch.join(format!("tile-{}-{}.sgrf", tile.row, tile.col))
    }
}

impl Drop for TileStore {
    fn drop(&mut self) {
        self.cleanup();
    }
}
