//! Dimension parameters shared by the structural and dataflow sides
//!
//! The grid shape fixes how many PEs get wired up; the tile shape fixes how
//! the tiler carves operands into passes. They are conventionally equal but
//! can be set independently.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SystolicError, SystolicResult};

/// Rows x columns of processing elements
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridDims {
    pub rows: usize,
    pub cols: usize,
}

impl GridDims {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn validate(&self) -> SystolicResult<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(SystolicError::invalid_dimension("grid", self.rows, self.cols));
        }
        Ok(())
    }
}

/// Tile shape used by the tiler
///
/// `rows` is the contraction depth of one pass (activation lanes), `cols` is
/// the number of output columns per pass (weight lanes).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TileDims {
    pub rows: usize,
    pub cols: usize,
}

impl TileDims {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn validate(&self) -> SystolicResult<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(SystolicError::invalid_dimension("tile", self.rows, self.cols));
        }
        Ok(())
    }
}

impl From<GridDims> for TileDims {
    fn from(grid: GridDims) -> Self {
        Self::new(grid.rows, grid.cols)
    }
}

/// Configuration for the systolic array and its feeder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystolicConfig {
    pub grid: GridDims,
    /// Defaults to the grid shape when omitted from a config file
    #[serde(default)]
    pub tiling: Option<TileDims>,
}

impl SystolicConfig {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            grid: GridDims::new(rows, cols),
            tiling: None,
        }
    }

    /// Square NxN array, tiled to match
    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    pub fn with_tiling(mut self, rows: usize, cols: usize) -> Self {
        self.tiling = Some(TileDims::new(rows, cols));
        self
    }

    /// Effective tile shape
    pub fn tile_dims(&self) -> TileDims {
        self.tiling.unwrap_or_else(|| self.grid.into())
    }

    pub fn validate(&self) -> SystolicResult<()> {
        self.grid.validate()?;
        self.tile_dims().validate()
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(source: &str) -> SystolicResult<Self> {
        let config: SystolicConfig = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> SystolicResult<Self> {
        let source = fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for SystolicConfig {
    fn default() -> Self {
        Self::square(4)
    }
}
