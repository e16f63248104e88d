//! Catchment delineation
//!
//! Marks every cell that drains to the pour point. The trace walks
//! upstream: a cell with one upstream neighbor continues in place, a
//! confluence (two or more) pushes each branch as a new frame one level
//! deeper. Only confluences cost depth, so long unbranched channels are
//! free, and a branch nesting deeper than `max_depth` is an error instead
//! of a silently partial mask.

use serde::{Deserialize, Serialize};
use tracing::debug;

use catchflow_core::raster::{NeighborRule, Raster, NO_FLOW};
use catchflow_core::{Error, Result};

use super::flow_accumulation::step_table;
use super::pour_point::{validate_pour_point, PourPoint};

/// Mask value for cells outside the catchment
pub const CATCHMENT_NODATA: u8 = 0;
/// Mask value for catchment members
pub const CATCHMENT_MEMBER: u8 = 1;

/// Parameters for catchment delineation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatchmentParams {
    /// Maximum confluence nesting below the pour point
    pub max_depth: usize,
}

impl Default for CatchmentParams {
    fn default() -> Self {
        Self { max_depth: 20_000 }
    }
}

/// Delineate the catchment draining to `pour_point`.
///
/// Returns a mask with [`CATCHMENT_MEMBER`] inside and [`CATCHMENT_NODATA`]
/// elsewhere (also set as the mask's no-data value). The pour point is
/// always a member.
///
/// # Errors
/// - [`Error::IndexOutOfBounds`] if the pour point is off the grid
/// - [`Error::InvalidDirectionCode`] for codes the rule does not define
/// - [`Error::DepthExceeded`] when confluences nest deeper than `max_depth`
pub fn catchment(
    flow_dir: &Raster<u8>,
    rule: NeighborRule,
    pour_point: PourPoint,
    params: &CatchmentParams,
) -> Result<Raster<u8>> {
    validate_pour_point(flow_dir, pour_point)?;
    step_table(flow_dir, rule)?;

    let offsets = rule.neighbor_offsets(false);
    let dirs = flow_dir.data();

    let mut mask = flow_dir.with_same_meta::<u8>();
    mask.set_nodata(Some(CATCHMENT_NODATA));

    let mut members = 0usize;
    let mut deepest = 0usize;
    let mut candidates: Vec<(usize, usize)> = Vec::with_capacity(offsets.len());
    let mut stack: Vec<(usize, usize, usize)> = vec![(pour_point.row(), pour_point.col(), 0)];

    {
        let out = mask.data_mut();
        while let Some((mut row, mut col, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            loop {
                if out[(row, col)] != CATCHMENT_MEMBER {
                    out[(row, col)] = CATCHMENT_MEMBER;
                    members += 1;
                }

                candidates.clear();
                for &(dx, dy) in &offsets {
                    let nr = row as isize + dy;
                    let nc = col as isize + dx;
                    if !flow_dir.contains(nr, nc) {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    let code = dirs[(nr, nc)];
                    if code != NO_FLOW && out[(nr, nc)] != CATCHMENT_MEMBER && rule.is_upstream(code, dx, dy) {
                        candidates.push((nr, nc));
                    }
                }

                match candidates.as_slice() {
                    [] => break,
                    [(r, c)] => {
                        row = *r;
                        col = *c;
                    }
                    branches => {
                        if depth + 1 > params.max_depth {
                            return Err(Error::DepthExceeded {
                                max_depth: params.max_depth,
                                x: col,
                                y: row,
                            });
                        }
                        stack.extend(branches.iter().rev().map(|&(r, c)| (r, c, depth + 1)));
                        break;
                    }
                }
            }
        }
    }

    debug!(
        "catchment at {}: {} cells, confluence depth {}",
        pour_point, members, deepest
    );
    Ok(mask)
}
