//! Pipeline configuration
//!
//! Serializable so a whole run can be described in one JSON document; every
//! field has a default, so `{}` is a valid configuration.

use serde::{Deserialize, Serialize};

use catchflow_core::raster::NeighborRule;
use catchflow_core::Result;

use crate::hydrology::{CatchmentParams, PitFillParams, PourPointStrategy};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Template for flow direction, accumulation and catchment
    pub rule: NeighborRule,
    pub pit_fill: PitFillParams,
    pub catchment: CatchmentParams,
    pub pour_point: PourPointStrategy,
}

impl PipelineConfig {
    /// Reject configurations that cannot run, before any grid is touched
    pub fn validate(&self) -> Result<()> {
        self.pit_fill.validate()
    }
}
