//! Watershed boundary extraction
//!
//! Keeps the member cells of a catchment mask that touch the outside. A
//! member is interior, and dropped, only when all four orthogonal
//! neighbors are members; cells off the grid count as outside, so members
//! on the grid edge are always boundary.

use catchflow_core::raster::{Raster, ORTHOGONAL_OFFSETS};
use catchflow_core::{Algorithm, Error, Result};

use super::catchment::{CATCHMENT_MEMBER, CATCHMENT_NODATA};

/// Watershed boundary algorithm
#[derive(Debug, Clone, Default)]
pub struct WatershedBoundary;

impl Algorithm for WatershedBoundary {
    type Input = Raster<u8>;
    type Output = Raster<u8>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Watershed Boundary"
    }

    fn description(&self) -> &'static str {
        "Outline cells of a catchment mask"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        watershed_boundary(&input)
    }
}

/// Reduce a catchment mask to its outline.
///
/// Same encoding as the input mask: [`CATCHMENT_MEMBER`] on the boundary,
/// [`CATCHMENT_NODATA`] elsewhere.
pub fn watershed_boundary(mask: &Raster<u8>) -> Result<Raster<u8>> {
    let (rows, cols) = mask.shape();
    let mut boundary = mask.with_same_meta::<u8>();
    boundary.set_nodata(Some(CATCHMENT_NODATA));

    let is_member = |row: isize, col: isize| {
        mask.contains(row, col) && unsafe { mask.get_unchecked(row as usize, col as usize) } == CATCHMENT_MEMBER
    };

    let out = boundary.data_mut();
    for row in 0..rows {
        for col in 0..cols {
            if !is_member(row as isize, col as isize) {
                continue;
            }
            let interior = ORTHOGONAL_OFFSETS
                .iter()
                .all(|&(dx, dy)| is_member(row as isize + dy, col as isize + dx));
            if !interior {
                out[(row, col)] = CATCHMENT_MEMBER;
            }
        }
    }

    Ok(boundary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mask(size: usize, from: usize, to: usize) -> Raster<u8> {
        let mut mask = Raster::new(size, size);
        for row in from..=to {
            for col in from..=to {
                mask.set(row, col, CATCHMENT_MEMBER).unwrap();
            }
        }
        mask
    }

    #[test]
    fn test_square_outline() {
        // 3x3 block inside a 5x5 grid: only its center is interior
        let mask = square_mask(5, 1, 3);
        let boundary = watershed_boundary(&mask).unwrap();

        assert_eq!(boundary.count_eq(CATCHMENT_MEMBER), 8);
        assert_eq!(boundary.get(2, 2).unwrap(), CATCHMENT_NODATA);
        assert_eq!(boundary.get(1, 1).unwrap(), CATCHMENT_MEMBER);
    }

    #[test]
    fn test_grid_edge_members_are_boundary() {
        let mask = Raster::filled(3, 3, CATCHMENT_MEMBER);
        let boundary = watershed_boundary(&mask).unwrap();

        assert_eq!(boundary.count_eq(CATCHMENT_MEMBER), 8);
        assert_eq!(boundary.get(1, 1).unwrap(), CATCHMENT_NODATA);
    }

    #[test]
    fn test_diagonal_gap_does_not_make_boundary() {
        // Center has all 4 orthogonal members but a missing diagonal
        let mut mask = square_mask(5, 1, 3);
        mask.set(1, 1, CATCHMENT_NODATA).unwrap();

        let boundary = watershed_boundary(&mask).unwrap();

        assert_eq!(boundary.get(2, 2).unwrap(), CATCHMENT_NODATA);
        assert_eq!(boundary.count_eq(CATCHMENT_MEMBER), 7);
    }

    #[test]
    fn test_boundary_subset_of_mask() {
        let mut mask = square_mask(8, 1, 6);
        mask.set(4, 6, CATCHMENT_NODATA).unwrap();
        mask.set(3, 3, CATCHMENT_NODATA).unwrap();

        let boundary = watershed_boundary(&mask).unwrap();

        for ((row, col), &b) in boundary.data().indexed_iter() {
            if b == CATCHMENT_MEMBER {
                assert_eq!(mask.get(row, col).unwrap(), CATCHMENT_MEMBER);
            }
        }
        // Cells around the hole become boundary
        assert_eq!(boundary.get(2, 3).unwrap(), CATCHMENT_MEMBER);
        assert_eq!(boundary.get(3, 4).unwrap(), CATCHMENT_MEMBER);
    }

    #[test]
    fn test_algorithm_trait() {
        let boundary = WatershedBoundary.execute_default(square_mask(4, 0, 3)).unwrap();
        assert_eq!(boundary.count_eq(CATCHMENT_MEMBER), 12);
        assert_eq!(boundary.nodata(), Some(CATCHMENT_NODATA));
    }
}
