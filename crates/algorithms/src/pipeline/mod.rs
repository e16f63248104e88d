//! Lazy hydrology pipeline
//!
//! [`Pipeline`] owns the elevation grid and every grid derived from it.
//! Asking for a stage computes whatever it depends on first, each stage at
//! most once; results are memoized until an input is replaced.
//!
//! ```text
//! elevation -> pit fill -> flow direction -> flow accumulation -> pour point
//!                               |                                    |
//!                               +------------> catchment <-----------+
//!                                                  |
//!                                              watershed
//! ```
//!
//! A pipeline can also start from a precomputed direction grid
//! ([`Pipeline::set_flow_direction`]); stages after it then never need
//! elevation.

mod config;
mod observer;

pub use config::PipelineConfig;
pub use observer::{PipelineEvent, PipelineObserver, Stage, TracingObserver};

use std::time::Instant;

use catchflow_core::raster::{CoordinateToIndex, Raster};
use catchflow_core::{Error, Result};

use crate::hydrology::{
    catchment, fill_pits, flow_accumulation, flow_direction, locate_pour_point, pour_point_from_coordinate,
    watershed_boundary, FillReport, FlowDirectionResult, PitFillResult, PourPoint, PourPointStrategy,
    CATCHMENT_MEMBER,
};

/// What a full run produced
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub pour_point: PourPoint,
    pub catchment_cells: usize,
    pub boundary_cells: usize,
    pub unresolved_cells: usize,
    /// `None` when the run started from a seeded direction grid
    pub fill_report: Option<FillReport>,
}

pub struct Pipeline {
    config: PipelineConfig,
    observer: Box<dyn PipelineObserver>,
    shape: Option<(usize, usize)>,
    elevation: Option<Raster<f64>>,
    fill: Option<PitFillResult>,
    directions: Option<FlowDirectionResult>,
    accumulation: Option<Raster<u32>>,
    /// Set by the caller; survives invalidation
    pinned_pour_point: Option<PourPoint>,
    pour_point: Option<PourPoint>,
    catchment: Option<Raster<u8>>,
    boundary: Option<Raster<u8>>,
}

impl Pipeline {
    /// Empty pipeline. The configuration is validated here, before any grid
    /// is supplied.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            observer: Box::new(TracingObserver),
            shape: None,
            elevation: None,
            fill: None,
            directions: None,
            accumulation: None,
            pinned_pour_point: None,
            pour_point: None,
            catchment: None,
            boundary: None,
        })
    }

    /// Pipeline rooted at an elevation grid
    pub fn from_elevation(elevation: Raster<f64>, config: PipelineConfig) -> Result<Self> {
        let mut pipeline = Self::new(config)?;
        pipeline.set_elevation(elevation);
        Ok(pipeline)
    }

    /// Replace the default [`TracingObserver`]
    pub fn with_observer(mut self, observer: impl PipelineObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn elevation(&self) -> Option<&Raster<f64>> {
        self.elevation.as_ref()
    }

    /// Grid dimensions as (rows, cols), once any grid is known
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    // Inputs

    /// Set the root grid. Everything derived so far, seeded grids included,
    /// is discarded.
    pub fn set_elevation(&mut self, elevation: Raster<f64>) {
        self.shape = Some(elevation.shape());
        self.elevation = Some(elevation);
        self.fill = None;
        self.invalidate_after(Stage::PitFill);
    }

    /// Seed a precomputed direction grid. Codes are checked against the
    /// configured rule and the shape against any grid already present.
    pub fn set_flow_direction(&mut self, directions: Raster<u8>) -> Result<()> {
        for &code in directions.data().iter() {
            self.config.rule.validate_code(code)?;
        }
        self.check_shape(directions.shape(), Stage::FlowDirection)?;
        self.directions = Some(FlowDirectionResult {
            directions,
            unresolved: Vec::new(),
        });
        self.invalidate_after(Stage::FlowDirection);
        Ok(())
    }

    /// Fix the pour point, overriding the configured strategy
    pub fn set_pour_point(&mut self, point: PourPoint) -> Result<()> {
        if let Some((rows, cols)) = self.shape {
            point.within(rows, cols)?;
        }
        self.pinned_pour_point = Some(point);
        self.pour_point = None;
        self.invalidate_after(Stage::PourPoint);
        Ok(())
    }

    /// Fix the pour point from a map coordinate
    pub fn set_pour_point_coordinate(
        &mut self,
        x: f64,
        y: f64,
        locator: &dyn CoordinateToIndex,
    ) -> Result<PourPoint> {
        let (rows, cols) = self.shape.ok_or(Error::MissingInput {
            stage: Stage::PourPoint.name(),
        })?;
        let point = pour_point_from_coordinate(x, y, locator, rows, cols)?;
        self.set_pour_point(point)?;
        Ok(point)
    }

    // Stages

    pub fn pit_fill(&mut self) -> Result<&PitFillResult> {
        self.ensure_fill(Stage::PitFill)?;
        self.fill.as_ref().ok_or(missing(Stage::PitFill))
    }

    pub fn filled(&mut self) -> Result<&Raster<f64>> {
        self.pit_fill().map(|r| &r.filled)
    }

    pub fn correction(&mut self) -> Result<&Raster<f64>> {
        self.pit_fill().map(|r| &r.correction)
    }

    pub fn flow_direction(&mut self) -> Result<&FlowDirectionResult> {
        self.ensure_directions(Stage::FlowDirection)?;
        self.directions.as_ref().ok_or(missing(Stage::FlowDirection))
    }

    pub fn directions(&mut self) -> Result<&Raster<u8>> {
        self.flow_direction().map(|r| &r.directions)
    }

    pub fn flow_accumulation(&mut self) -> Result<&Raster<u32>> {
        self.ensure_accumulation(Stage::FlowAccumulation)?;
        self.accumulation.as_ref().ok_or(missing(Stage::FlowAccumulation))
    }

    pub fn pour_point(&mut self) -> Result<PourPoint> {
        self.ensure_pour_point(Stage::PourPoint)?;
        self.pour_point.ok_or(missing(Stage::PourPoint))
    }

    pub fn catchment(&mut self) -> Result<&Raster<u8>> {
        self.ensure_catchment(Stage::Catchment)?;
        self.catchment.as_ref().ok_or(missing(Stage::Catchment))
    }

    pub fn watershed_boundary(&mut self) -> Result<&Raster<u8>> {
        self.ensure_boundary(Stage::Watershed)?;
        self.boundary.as_ref().ok_or(missing(Stage::Watershed))
    }

    /// Compute every stage the inputs allow and summarize.
    ///
    /// Accumulation is computed even for an explicit pour point, so a run
    /// always yields the full set of grids. Pit fill is skipped when the
    /// pipeline was seeded with directions and has no elevation.
    pub fn run(&mut self) -> Result<PipelineSummary> {
        if self.directions.is_none() || self.elevation.is_some() {
            self.ensure_fill(Stage::PitFill)?;
        }
        self.ensure_accumulation(Stage::FlowAccumulation)?;
        self.ensure_boundary(Stage::Watershed)?;

        Ok(PipelineSummary {
            pour_point: self.pour_point.ok_or(missing(Stage::PourPoint))?,
            catchment_cells: self.catchment.as_ref().map_or(0, |m| m.count_eq(CATCHMENT_MEMBER)),
            boundary_cells: self.boundary.as_ref().map_or(0, |m| m.count_eq(CATCHMENT_MEMBER)),
            unresolved_cells: self.directions.as_ref().map_or(0, |d| d.unresolved.len()),
            fill_report: self.fill.as_ref().map(|f| f.report),
        })
    }

    // Orchestration

    fn notify(&self, event: PipelineEvent) {
        self.observer.notify(&event);
    }

    fn finished(&self, stage: Stage, start: Instant) {
        self.notify(PipelineEvent::StageFinished {
            stage,
            elapsed: start.elapsed(),
        });
    }

    fn check_shape(&mut self, shape: (usize, usize), stage: Stage) -> Result<()> {
        match self.shape {
            Some((er, ec)) if (er, ec) != shape => Err(Error::SizeMismatch {
                stage: stage.name(),
                er,
                ec,
                ar: shape.0,
                ac: shape.1,
            }),
            Some(_) => Ok(()),
            None => {
                self.shape = Some(shape);
                Ok(())
            }
        }
    }

    /// Drop every memoized grid computed after `stage`
    fn invalidate_after(&mut self, stage: Stage) {
        if stage < Stage::FlowDirection {
            self.directions = None;
        }
        if stage < Stage::FlowAccumulation {
            self.accumulation = None;
        }
        if stage < Stage::PourPoint {
            self.pour_point = None;
        }
        if stage < Stage::Catchment {
            self.catchment = None;
        }
        if stage < Stage::Watershed {
            self.boundary = None;
        }
    }

    fn ensure_fill(&mut self, requested: Stage) -> Result<()> {
        if self.fill.is_some() {
            return Ok(());
        }
        let elevation = self.elevation.as_ref().ok_or(missing(requested))?;

        let start = Instant::now();
        let result = fill_pits(elevation, &self.config.pit_fill)?;
        self.check_shape(result.filled.shape(), Stage::PitFill)?;

        if result.report.cap_reached {
            self.notify(PipelineEvent::NormalFillCapReached {
                passes: result.report.passes,
            });
        }
        if result.report.drying_truncations > 0 {
            self.notify(PipelineEvent::DryingTruncated {
                branches: result.report.drying_truncations,
            });
        }
        self.finished(Stage::PitFill, start);
        self.fill = Some(result);
        Ok(())
    }

    fn ensure_directions(&mut self, requested: Stage) -> Result<()> {
        if self.directions.is_some() {
            return Ok(());
        }
        self.ensure_fill(requested)?;
        let filled = self.fill.as_ref().map(|f| &f.filled).ok_or(missing(requested))?;

        let start = Instant::now();
        let result = flow_direction(filled, self.config.rule)?;
        self.check_shape(result.directions.shape(), Stage::FlowDirection)?;

        for &(x, y) in &result.unresolved {
            self.notify(PipelineEvent::UnresolvedFlow { x, y });
        }
        self.finished(Stage::FlowDirection, start);
        self.directions = Some(result);
        Ok(())
    }

    fn ensure_accumulation(&mut self, requested: Stage) -> Result<()> {
        if self.accumulation.is_some() {
            return Ok(());
        }
        self.ensure_directions(requested)?;
        let directions = self.directions.as_ref().map(|d| &d.directions).ok_or(missing(requested))?;

        let start = Instant::now();
        let result = flow_accumulation(directions, self.config.rule)?;
        self.check_shape(result.shape(), Stage::FlowAccumulation)?;

        self.finished(Stage::FlowAccumulation, start);
        self.accumulation = Some(result);
        Ok(())
    }

    fn ensure_pour_point(&mut self, requested: Stage) -> Result<()> {
        if self.pour_point.is_some() {
            return Ok(());
        }

        let start = Instant::now();
        let explicit = match (self.pinned_pour_point, &self.config.pour_point) {
            (Some(point), _) => Some(point),
            (None, PourPointStrategy::Explicit { x, y }) => Some(PourPoint::new(*x, *y)),
            _ => None,
        };
        let point = match explicit {
            Some(point) => {
                let (rows, cols) = self.shape.ok_or(missing(requested))?;
                point.within(rows, cols)?
            }
            None => {
                self.ensure_accumulation(requested)?;
                let accumulation = self.accumulation.as_ref().ok_or(missing(requested))?;
                locate_pour_point(accumulation, &self.config.pour_point)?
            }
        };

        self.notify(PipelineEvent::PourPointSelected { point });
        self.finished(Stage::PourPoint, start);
        self.pour_point = Some(point);
        Ok(())
    }

    fn ensure_catchment(&mut self, requested: Stage) -> Result<()> {
        if self.catchment.is_some() {
            return Ok(());
        }
        self.ensure_directions(requested)?;
        self.ensure_pour_point(requested)?;
        let point = self.pour_point.ok_or(missing(requested))?;
        let directions = self.directions.as_ref().map(|d| &d.directions).ok_or(missing(requested))?;

        let start = Instant::now();
        let mask = catchment(directions, self.config.rule, point, &self.config.catchment)?;
        self.check_shape(mask.shape(), Stage::Catchment)?;

        self.finished(Stage::Catchment, start);
        self.catchment = Some(mask);
        Ok(())
    }

    fn ensure_boundary(&mut self, requested: Stage) -> Result<()> {
        if self.boundary.is_some() {
            return Ok(());
        }
        self.ensure_catchment(requested)?;
        let mask = self.catchment.as_ref().ok_or(missing(requested))?;

        let start = Instant::now();
        let boundary = watershed_boundary(mask)?;
        self.check_shape(boundary.shape(), Stage::Watershed)?;

        self.finished(Stage::Watershed, start);
        self.boundary = Some(boundary);
        Ok(())
    }
}

fn missing(stage: Stage) -> Error {
    Error::MissingInput { stage: stage.name() }
}
