//! Flow accumulation
//!
//! Counts, for every cell, how many other cells drain through it. Each
//! source cell walks its downstream path and adds one to every cell it
//! reaches. Walks end at a [`NO_FLOW`] cell, at the grid edge, or when the
//! path comes back to a cell it already visited (a routing loop).
//!
//! Sources run in parallel and add into atomic counters, so the result is
//! the same for any scheduling. The walk is O(cells x path length); that
//! is the cost of tolerating loops in hand-made direction grids.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};

use ndarray::Array2;
use tracing::debug;

use crate::maybe_rayon::*;
use catchflow_core::raster::{NeighborRule, Raster, NO_FLOW};
use catchflow_core::{Algorithm, Error, Result};

/// Flow accumulation algorithm
#[derive(Debug, Clone, Default)]
pub struct FlowAccumulation;

impl Algorithm for FlowAccumulation {
    type Input = Raster<u8>;
    type Output = Raster<u32>;
    type Params = NeighborRule;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Accumulation"
    }

    fn description(&self) -> &'static str {
        "Count upstream cells from a D8/D16 flow direction grid"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        flow_accumulation(&input, params)
    }
}

/// Code -> step lookup for every code of the rule. Fails on any code in
/// `flow_dir` that the rule does not define.
pub(crate) fn step_table(flow_dir: &Raster<u8>, rule: NeighborRule) -> Result<[Option<(isize, isize)>; 256]> {
    let mut table = [None; 256];
    for code in rule.codes() {
        table[code as usize] = Some(rule.downstream_delta(code)?);
    }
    for &code in flow_dir.data().iter() {
        if code != NO_FLOW && table[code as usize].is_none() {
            return Err(Error::InvalidDirectionCode { code, rule: rule.name() });
        }
    }
    Ok(table)
}

/// Calculate flow accumulation from a flow direction grid.
///
/// Cells with no upstream contributors get 0; the source cell itself is
/// never counted.
///
/// # Errors
/// [`Error::InvalidDirectionCode`] if the grid holds a code the rule does
/// not define.
pub fn flow_accumulation(flow_dir: &Raster<u8>, rule: NeighborRule) -> Result<Raster<u32>> {
    let (rows, cols) = flow_dir.shape();
    let table = step_table(flow_dir, rule)?;

    let counts: Vec<AtomicU32> = (0..rows * cols).map(|_| AtomicU32::new(0)).collect();
    let data = flow_dir.data();

    (0..rows * cols).into_par_iter().for_each(|source| {
        let mut visited = HashSet::new();
        visited.insert(source);
        let (mut row, mut col) = (source / cols, source % cols);

        while let Some((dx, dy)) = table[data[(row, col)] as usize] {
            let nr = row as isize + dy;
            let nc = col as isize + dx;
            if !flow_dir.contains(nr, nc) {
                break;
            }
            let (nr, nc) = (nr as usize, nc as usize);
            let next = nr * cols + nc;
            if !visited.insert(next) {
                debug!("routing loop reached from ({}, {}) at ({}, {})", source % cols, source / cols, nc, nr);
                break;
            }
            counts[next].fetch_add(1, Ordering::Relaxed);
            row = nr;
            col = nc;
        }
    });

    let values: Vec<u32> = counts.into_iter().map(AtomicU32::into_inner).collect();
    let mut output = flow_dir.with_same_meta::<u32>();
    output.replace_data(
        Array2::from_shape_vec((rows, cols), values).map_err(|e| Error::Other(e.to_string()))?,
    )?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const E: u8 = 1;
    const S: u8 = 4;
    const W: u8 = 16;

    #[test]
    fn test_flow_accumulation_linear() {
        // 1x5 line, everything flows east into the last cell
        let mut fdir = Raster::filled(1, 5, E);
        fdir.set(0, 4, NO_FLOW).unwrap();

        let acc = flow_accumulation(&fdir, NeighborRule::D8).unwrap();

        for col in 0..5 {
            assert_eq!(acc.get(0, col).unwrap(), col as u32);
        }
    }

    #[test]
    fn test_flow_accumulation_convergent() {
        // 3x3, all cells drain to the bottom-center outlet
        let fdir = Raster::from_vec(
            vec![
                2, S, 8, //
                2, S, 8, //
                E, NO_FLOW, W,
            ],
            3,
            3,
        )
        .unwrap();

        let acc = flow_accumulation(&fdir, NeighborRule::D8).unwrap();

        assert_eq!(acc.get(2, 1).unwrap(), 8);
        assert_eq!(acc.get(1, 1).unwrap(), 3);
        assert_eq!(acc.get(0, 0).unwrap(), 0);
    }

    #[test]
    fn test_mass_conservation() {
        // Every cell flows east then exits the grid: sum over the exit column
        // plus the cells themselves covers the whole grid
        let rows = 4;
        let cols = 6;
        let fdir = Raster::filled(rows, cols, E);

        let acc = flow_accumulation(&fdir, NeighborRule::D8).unwrap();

        let exits: u32 = (0..rows).map(|row| acc.get(row, cols - 1).unwrap() + 1).sum();
        assert_eq!(exits as usize, rows * cols);
    }

    #[test]
    fn test_routing_loop_terminates() {
        // Two cells pointing at each other
        let fdir = Raster::from_vec(vec![E, W], 1, 2).unwrap();

        let acc = flow_accumulation(&fdir, NeighborRule::D8).unwrap();

        assert_eq!(acc.get(0, 0).unwrap(), 1);
        assert_eq!(acc.get(0, 1).unwrap(), 1);
    }

    #[test]
    fn test_invalid_code_rejected() {
        let fdir = Raster::filled(2, 2, 3u8);
        let err = flow_accumulation(&fdir, NeighborRule::D8).unwrap_err();
        assert_eq!(err, Error::InvalidDirectionCode { code: 3, rule: "D8" });
        // 3 is a valid D16 code
        assert!(flow_accumulation(&fdir, NeighborRule::D16).is_ok());
    }

    #[test]
    fn test_d16_knight_step() {
        // D16 code 12 is (dx, dy) = (1, 2)
        let mut fdir = Raster::new(3, 2);
        fdir.set(0, 0, 12).unwrap();

        let acc = flow_accumulation(&fdir, NeighborRule::D16).unwrap();

        assert_eq!(acc.get(2, 1).unwrap(), 1);
        assert_eq!(acc.data().iter().sum::<u32>(), 1);
    }

    #[test]
    fn test_algorithm_trait() {
        let fdir = Raster::filled(1, 3, E);
        let acc = FlowAccumulation.execute_default(fdir).unwrap();
        assert_eq!(acc.get(0, 2).unwrap(), 2);
    }
}
