//! Error types for catchflow

use thiserror::Error;

/// Main error type for catchflow operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch in {stage}: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch {
        stage: &'static str,
        er: usize,
        ec: usize,
        ar: usize,
        ac: usize,
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unknown neighbor rule: {0} (expected D8 or D16)")]
    UnknownNeighborRule(String),

    #[error("Unknown pit fill algorithm: {0} (expected normal, planchon_2001 or yamazaki_2012)")]
    UnknownAlgorithm(String),

    #[error("Algorithm not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Direction code {code} is not part of the {rule} rule")]
    InvalidDirectionCode { code: u8, rule: &'static str },

    #[error("Missing input: stage '{stage}' requires an elevation grid")]
    MissingInput { stage: &'static str },

    #[error("Catchment traversal depth exceeded {max_depth} at ({x}, {y})")]
    DepthExceeded { max_depth: usize, x: usize, y: usize },

    #[error("No cell with accumulation >= {threshold} within radius {max_radius}")]
    PourPointNotFound { threshold: u32, max_radius: usize },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for catchflow operations
pub type Result<T> = std::result::Result<T, Error>;
