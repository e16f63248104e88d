//! Hydrological analysis stages
//!
//! Each stage is a free function plus an [`Algorithm`](catchflow_core::Algorithm)
//! wrapper where the inputs fit one grid:
//! - Pit fill: normal or Planchon-Darboux (2001) depression removal
//! - Flow direction: steepest descent over a D8 or D16 template
//! - Flow accumulation: upstream cell counts
//! - Pour point: explicit, map coordinate, max accumulation, or threshold search
//! - Catchment: upstream mask of a pour point
//! - Watershed: outline of a catchment mask

mod catchment;
mod flow_accumulation;
mod flow_direction;
mod pit_fill;
mod planchon;
mod pour_point;
mod watershed;

pub use catchment::{catchment, CatchmentParams, CATCHMENT_MEMBER, CATCHMENT_NODATA};
pub use flow_accumulation::{flow_accumulation, FlowAccumulation};
pub use flow_direction::{flow_direction, FlowDirection, FlowDirectionResult};
pub use pit_fill::{
    fill_pits, FillReport, PitFill, PitFillMethod, PitFillParams, PitFillResult, NORMAL_CORRECTION,
    NORMAL_MAX_PASSES,
};
pub use pour_point::{
    locate_pour_point, max_accumulation_point, pour_point_from_coordinate, search_threshold_point,
    validate_pour_point, PourPoint, PourPointStrategy,
};
pub use watershed::{watershed_boundary, WatershedBoundary};
