//! Steepest-descent flow direction (D8 / D16)
//!
//! Each cell points at the neighbor with the steepest drop, where
//! `drop = (center - neighbor) / distance` and distance is measured in
//! cells (`1`, `sqrt(2)`, or `sqrt(5)` for D16 knight moves). Codes follow
//! the [`NeighborRule`] matrix; see `catchflow_core::raster::NeighborRule`.
//!
//! Only strictly lower neighbors count. A cell with none keeps
//! [`NO_FLOW`] and is reported as unresolved; on a filled DEM that only
//! happens on flats left by `eta = 0`.

use ndarray::Array2;
use tracing::debug;

use crate::maybe_rayon::*;
use catchflow_core::raster::{NeighborRule, Raster, NO_FLOW};
use catchflow_core::{Algorithm, Error, Result};

/// Flow direction grid plus the cells that found no lower neighbor
#[derive(Debug, Clone)]
pub struct FlowDirectionResult {
    pub directions: Raster<u8>,
    /// `(x, y)` of cells left at [`NO_FLOW`], in row-major order
    pub unresolved: Vec<(usize, usize)>,
}

/// Flow direction algorithm
#[derive(Debug, Clone, Default)]
pub struct FlowDirection;

impl Algorithm for FlowDirection {
    type Input = Raster<f64>;
    type Output = FlowDirectionResult;
    type Params = NeighborRule;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Direction"
    }

    fn description(&self) -> &'static str {
        "Steepest-descent flow direction (D8 or D16) from a filled DEM"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        flow_direction(&input, params)
    }
}

#[derive(Debug, Clone, Copy)]
struct Step {
    dx: isize,
    dy: isize,
    distance: f64,
    code: u8,
}

fn steps(rule: NeighborRule) -> Vec<Step> {
    rule.neighbor_offsets(false)
        .into_iter()
        .filter_map(|(dx, dy)| {
            rule.code_from_delta(dx, dy).map(|code| Step {
                dx,
                dy,
                distance: ((dx * dx + dy * dy) as f64).sqrt(),
                code,
            })
        })
        .collect()
}

/// Compute flow directions on a (filled) DEM.
///
/// Ties keep the first neighbor in template row-major order. No-data cells
/// get [`NO_FLOW`] and are not reported as unresolved; no-data neighbors
/// are ignored.
pub fn flow_direction(dem: &Raster<f64>, rule: NeighborRule) -> Result<FlowDirectionResult> {
    let (rows, cols) = dem.shape();
    let steps = steps(rule);

    let per_row: Vec<(Vec<u8>, Vec<(usize, usize)>)> = (0..rows)
        .into_par_iter()
        .map(|row| {
            let mut row_data = vec![NO_FLOW; cols];
            let mut unresolved = Vec::new();

            for col in 0..cols {
                let center = unsafe { dem.get_unchecked(row, col) };
                if center.is_nan() || dem.is_nodata(center) {
                    continue;
                }

                let mut max_drop = 0.0_f64;
                let mut best = NO_FLOW;

                for step in &steps {
                    let nr = row as isize + step.dy;
                    let nc = col as isize + step.dx;
                    if !dem.contains(nr, nc) {
                        continue;
                    }

                    let neighbor = unsafe { dem.get_unchecked(nr as usize, nc as usize) };
                    if neighbor.is_nan() || dem.is_nodata(neighbor) || neighbor >= center {
                        continue;
                    }

                    let drop = (center - neighbor) / step.distance;
                    if best == NO_FLOW || drop > max_drop {
                        max_drop = drop;
                        best = step.code;
                    }
                }

                if best == NO_FLOW {
                    unresolved.push((col, row));
                }
                row_data[col] = best;
            }

            (row_data, unresolved)
        })
        .collect();

    let mut data = Vec::with_capacity(rows * cols);
    let mut unresolved = Vec::new();
    for (row_data, row_unresolved) in per_row {
        data.extend(row_data);
        unresolved.extend(row_unresolved);
    }

    if !unresolved.is_empty() {
        debug!("{} cells have no lower {} neighbor", unresolved.len(), rule);
    }

    let mut directions = dem.with_same_meta::<u8>();
    directions.replace_data(
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?,
    )?;

    Ok(FlowDirectionResult { directions, unresolved })
}
