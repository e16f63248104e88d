//! # catchflow core
//!
//! Core types and traits shared by the catchflow hydrology pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: Generic dense grid type
//! - `GeoTransform`: Affine transform used to turn map coordinates into grid indices
//! - `NeighborRule`: D8 / D16 direction-code templates
//! - Algorithm trait for a consistent stage API

pub mod error;
pub mod raster;

pub use error::{Error, Result};
pub use raster::{CoordinateToIndex, GeoTransform, NeighborRule, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{CoordinateToIndex, GeoTransform, NeighborRule, Raster, RasterElement};
    pub use crate::Algorithm;
}

/// Core trait for all pipeline stages.
///
/// Stages are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
