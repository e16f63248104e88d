//! Pipeline progress events
//!
//! Stages report through a [`PipelineObserver`] instead of printing. Any
//! `Fn(&PipelineEvent)` closure is an observer; [`TracingObserver`] is the
//! default and forwards everything to `tracing`.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::hydrology::PourPoint;

/// Pipeline stages, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PitFill,
    FlowDirection,
    FlowAccumulation,
    PourPoint,
    Catchment,
    Watershed,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::PitFill => "pit_fill",
            Stage::FlowDirection => "flow_direction",
            Stage::FlowAccumulation => "flow_accumulation",
            Stage::PourPoint => "pour_point",
            Stage::Catchment => "catchment",
            Stage::Watershed => "watershed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StageFinished { stage: Stage, elapsed: Duration },
    /// A cell kept no outflow after flow direction (flat or pit)
    UnresolvedFlow { x: usize, y: usize },
    /// Planchon drying abandoned branches at its depth cap
    DryingTruncated { branches: usize },
    /// Normal fill stopped at its pass cap with pits left
    NormalFillCapReached { passes: usize },
    PourPointSelected { point: PourPoint },
}

pub trait PipelineObserver {
    fn notify(&self, event: &PipelineEvent);
}

impl<F> PipelineObserver for F
where
    F: Fn(&PipelineEvent),
{
    fn notify(&self, event: &PipelineEvent) {
        self(event)
    }
}

/// Logs events with `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn notify(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageFinished { stage, elapsed } => {
                info!(stage = stage.name(), elapsed_ms = elapsed.as_millis() as u64, "stage finished");
            }
            PipelineEvent::UnresolvedFlow { x, y } => {
                debug!(x, y, "cell has no lower neighbor");
            }
            PipelineEvent::DryingTruncated { branches } => {
                debug!(branches, "planchon drying truncated");
            }
            PipelineEvent::NormalFillCapReached { passes } => {
                warn!(passes, "normal fill hit its pass cap, pits may remain");
            }
            PipelineEvent::PourPointSelected { point } => {
                info!(x = point.x, y = point.y, "pour point selected");
            }
        }
    }
}
