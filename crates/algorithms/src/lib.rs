//! # catchflow algorithms
//!
//! DEM hydrology: from a raw elevation grid to the catchment draining to a
//! pour point and its outline.
//!
//! ## Modules
//!
//! - **hydrology**: the individual stages (pit fill, flow direction, flow
//!   accumulation, pour point, catchment, watershed boundary)
//! - **pipeline**: lazy, memoizing orchestration of those stages
//!
//! ```
//! use catchflow_algorithms::prelude::*;
//!
//! let mut dem: Raster<f64> = Raster::new(5, 5);
//! for row in 0..5 {
//!     for col in 0..5 {
//!         dem.set(row, col, (10 - row - col) as f64).unwrap();
//!     }
//! }
//!
//! let mut pipeline = Pipeline::from_elevation(dem, PipelineConfig::default()).unwrap();
//! let summary = pipeline.run().unwrap();
//! assert_eq!(summary.pour_point, PourPoint::new(4, 4));
//! ```

pub mod hydrology;
pub mod pipeline;

pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::hydrology::{
        catchment, fill_pits, flow_accumulation, flow_direction, locate_pour_point, watershed_boundary,
        CatchmentParams, FillReport, FlowAccumulation, FlowDirection, FlowDirectionResult, PitFill,
        PitFillMethod, PitFillParams, PitFillResult, PourPoint, PourPointStrategy, WatershedBoundary,
        CATCHMENT_MEMBER, CATCHMENT_NODATA,
    };
    pub use crate::pipeline::{
        Pipeline, PipelineConfig, PipelineEvent, PipelineObserver, PipelineSummary, Stage, TracingObserver,
    };
    pub use catchflow_core::prelude::*;
}
