//! Error types for geozonal

use std::time::Duration;
use thiserror::Error;

/// Main error type for geozonal operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unsupported input. Fatal to the load step.
    #[error("Format error: {0}")]
    Format(String),

    /// Missing or incompatible coordinate reference systems.
    #[error("CRS error: {source_crs} -> {target_crs} ({reason})")]
    Crs {
        source_crs: String,
        target_crs: String,
        reason: String,
    },

    /// Coordinate outside the spatial extent of a field. Recoverable.
    #[error("Coordinate ({x}, {y}) outside field extent")]
    OutOfBounds { x: f64, y: f64 },

    #[error("Load timed out after {0:?}")]
    Timeout(Duration),

    #[error("Run cancelled after {completed} of {total} zones")]
    Cancelled { completed: usize, total: usize },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Format`] with a formatted message
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Whether the error only affects a single sample and the run may continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::OutOfBounds { .. })
    }
}

/// Result type alias for geozonal operations
pub type Result<T> = std::result::Result<T, Error>;
