//! Pour point selection
//!
//! A pour point is the outlet cell a catchment is traced from. It can be
//! given directly as grid indices, translated from a map coordinate by a
//! [`CoordinateToIndex`], or searched for on the accumulation grid.
//!
//! Grid indices here are `(x, y)` = `(col, row)`.

use std::fmt;

use serde::{Deserialize, Serialize};

use catchflow_core::raster::{CoordinateToIndex, Raster, RasterElement};
use catchflow_core::{Error, Result};

/// Outlet cell, `x` = column, `y` = row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PourPoint {
    pub x: usize,
    pub y: usize,
}

impl PourPoint {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    pub fn row(&self) -> usize {
        self.y
    }

    pub fn col(&self) -> usize {
        self.x
    }

    /// Fail with [`Error::IndexOutOfBounds`] unless the point is on a
    /// `rows` x `cols` grid
    pub fn within(self, rows: usize, cols: usize) -> Result<Self> {
        if self.y >= rows || self.x >= cols {
            return Err(Error::IndexOutOfBounds {
                row: self.y,
                col: self.x,
                rows,
                cols,
            });
        }
        Ok(self)
    }
}

impl fmt::Display for PourPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// How the pipeline picks its pour point
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PourPointStrategy {
    /// Fixed cell
    Explicit { x: usize, y: usize },
    /// Cell with the largest accumulation
    #[default]
    MaxAccumulation,
    /// Nearest cell to `start` whose accumulation reaches `threshold`
    Threshold {
        threshold: u32,
        /// Defaults to the grid center
        #[serde(default)]
        start: Option<PourPoint>,
        /// Defaults to `max(rows, cols)`
        #[serde(default)]
        max_radius: Option<usize>,
    },
}

/// Check that `point` lies on `grid`
pub fn validate_pour_point<T: RasterElement>(grid: &Raster<T>, point: PourPoint) -> Result<PourPoint> {
    let (rows, cols) = grid.shape();
    point.within(rows, cols)
}

/// Translate a map coordinate into a pour point on a `rows` x `cols` grid
pub fn pour_point_from_coordinate(
    x: f64,
    y: f64,
    locator: &dyn CoordinateToIndex,
    rows: usize,
    cols: usize,
) -> Result<PourPoint> {
    locator
        .to_index(x, y, rows, cols)
        .map(|(row, col)| PourPoint::new(col, row))
        .ok_or_else(|| Error::InvalidParameter {
            name: "pour_point",
            value: format!("({}, {})", x, y),
            reason: format!("coordinate falls outside the {}x{} grid", rows, cols),
        })
}

/// Cell with the largest accumulation.
///
/// Scans row-major from the first cell and only moves on a strictly larger
/// value, so ties keep the first cell and an all-zero grid yields `(0, 0)`.
pub fn max_accumulation_point(accumulation: &Raster<u32>) -> Result<PourPoint> {
    if accumulation.is_empty() {
        return Err(Error::InvalidDimensions {
            width: accumulation.cols(),
            height: accumulation.rows(),
        });
    }

    let mut best = PourPoint::new(0, 0);
    let mut best_value = accumulation.get(0, 0)?;
    for ((row, col), &value) in accumulation.data().indexed_iter() {
        if value > best_value {
            best_value = value;
            best = PourPoint::new(col, row);
        }
    }
    Ok(best)
}

/// Offsets `(dx, dy)` on the square ring at Chebyshev distance `radius`,
/// row-major. Radius 0 is the center alone.
fn ring(radius: isize) -> impl Iterator<Item = (isize, isize)> {
    (-radius..=radius).flat_map(move |dy| {
        let step = if dy.abs() == radius { 1 } else { (2 * radius) as usize };
        (-radius..=radius).step_by(step).map(move |dx| (dx, dy))
    })
}

/// Nearest cell to `start` with accumulation `>= threshold`.
///
/// Rings of growing Chebyshev radius are searched outward from `start`,
/// each in row-major order, so the first hit is the closest one and ties
/// go to the upper-left.
///
/// # Errors
/// [`Error::PourPointNotFound`] when no ring up to `max_radius` has a
/// qualifying cell; [`Error::IndexOutOfBounds`] if `start` is off the grid.
pub fn search_threshold_point(
    accumulation: &Raster<u32>,
    start: Option<PourPoint>,
    threshold: u32,
    max_radius: Option<usize>,
) -> Result<PourPoint> {
    let (rows, cols) = accumulation.shape();
    let start = start.unwrap_or(PourPoint::new(cols / 2, rows / 2));
    validate_pour_point(accumulation, start)?;
    let max_radius = max_radius.unwrap_or(rows.max(cols));
    // Rings past the larger dimension hold no in-grid cells
    let last_ring = max_radius.min(rows.max(cols)) as isize;

    for radius in 0..=last_ring {
        for (dx, dy) in ring(radius) {
            let row = start.y as isize + dy;
            let col = start.x as isize + dx;
            if !accumulation.contains(row, col) {
                continue;
            }
            let value = unsafe { accumulation.get_unchecked(row as usize, col as usize) };
            if value >= threshold {
                return Ok(PourPoint::new(col as usize, row as usize));
            }
        }
    }

    Err(Error::PourPointNotFound { threshold, max_radius })
}

/// Resolve a data-driven strategy against an accumulation grid
pub fn locate_pour_point(accumulation: &Raster<u32>, strategy: &PourPointStrategy) -> Result<PourPoint> {
    match strategy {
        PourPointStrategy::Explicit { x, y } => validate_pour_point(accumulation, PourPoint::new(*x, *y)),
        PourPointStrategy::MaxAccumulation => max_accumulation_point(accumulation),
        PourPointStrategy::Threshold {
            threshold,
            start,
            max_radius,
        } => search_threshold_point(accumulation, *start, *threshold, *max_radius),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catchflow_core::GeoTransform;

    fn acc_from(rows: usize, cols: usize, values: &[(usize, usize, u32)]) -> Raster<u32> {
        let mut acc = Raster::new(rows, cols);
        for &(row, col, v) in values {
            acc.set(row, col, v).unwrap();
        }
        acc
    }

    #[test]
    fn test_ring_shapes() {
        assert_eq!(ring(0).collect::<Vec<_>>(), vec![(0, 0)]);
        let r1: Vec<_> = ring(1).collect();
        assert_eq!(r1, vec![(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)]);
        assert_eq!(ring(2).count(), 16);
        assert!(ring(3).all(|(dx, dy)| dx.abs().max(dy.abs()) == 3));
    }

    #[test]
    fn test_max_accumulation_first_strict_max() {
        let acc = acc_from(3, 3, &[(1, 2, 7), (2, 0, 7), (0, 1, 3)]);
        assert_eq!(max_accumulation_point(&acc).unwrap(), PourPoint::new(2, 1));
    }

    #[test]
    fn test_max_accumulation_all_zero() {
        let acc: Raster<u32> = Raster::new(4, 4);
        assert_eq!(max_accumulation_point(&acc).unwrap(), PourPoint::new(0, 0));
    }

    #[test]
    fn test_max_accumulation_empty_grid() {
        let acc: Raster<u32> = Raster::new(0, 3);
        assert!(matches!(max_accumulation_point(&acc), Err(Error::InvalidDimensions { .. })));
    }

    #[test]
    fn test_threshold_search_nearest_ring() {
        // Center of 7x7 is (3, 3); qualifying cells at distance 2 and 3
        let acc = acc_from(7, 7, &[(3, 6, 50), (5, 4, 20), (1, 1, 20)]);

        let p = search_threshold_point(&acc, None, 10, None).unwrap();

        // (1, 1) and (5, 4) are both on ring 2; (1, 1) comes first row-major
        assert_eq!(p, PourPoint::new(1, 1));
    }

    #[test]
    fn test_threshold_search_start_cell_itself() {
        let acc = acc_from(5, 5, &[(0, 0, 100)]);
        let p = search_threshold_point(&acc, Some(PourPoint::new(0, 0)), 100, None).unwrap();
        assert_eq!(p, PourPoint::new(0, 0));
    }

    #[test]
    fn test_threshold_search_radius_exhausted() {
        let acc = acc_from(9, 9, &[(0, 0, 100)]);
        let err = search_threshold_point(&acc, Some(PourPoint::new(8, 8)), 50, Some(3)).unwrap_err();
        assert_eq!(err, Error::PourPointNotFound { threshold: 50, max_radius: 3 });

        let err = search_threshold_point(&acc, None, 500, None).unwrap_err();
        assert_eq!(err, Error::PourPointNotFound { threshold: 500, max_radius: 9 });
    }

    #[test]
    fn test_threshold_search_huge_radius() {
        let acc = acc_from(9, 9, &[(0, 0, 100)]);
        let p = search_threshold_point(&acc, Some(PourPoint::new(8, 8)), 50, Some(usize::MAX)).unwrap();
        assert_eq!(p, PourPoint::new(0, 0));

        let err = search_threshold_point(&acc, None, 500, Some(usize::MAX)).unwrap_err();
        assert_eq!(err, Error::PourPointNotFound { threshold: 500, max_radius: usize::MAX });
    }

    #[test]
    fn test_explicit_point_validated() {
        let acc: Raster<u32> = Raster::new(3, 4);
        let strategy = PourPointStrategy::Explicit { x: 3, y: 2 };
        assert_eq!(locate_pour_point(&acc, &strategy).unwrap(), PourPoint::new(3, 2));

        let strategy = PourPointStrategy::Explicit { x: 4, y: 0 };
        assert!(matches!(
            locate_pour_point(&acc, &strategy),
            Err(Error::IndexOutOfBounds { row: 0, col: 4, .. })
        ));
    }

    #[test]
    fn test_coordinate_translation() {
        let gt = GeoTransform::new(500.0, 1000.0, 10.0, -10.0);
        let p = pour_point_from_coordinate(535.0, 975.0, &gt, 5, 5).unwrap();
        assert_eq!(p, PourPoint::new(3, 2));

        assert!(pour_point_from_coordinate(0.0, 0.0, &gt, 5, 5).is_err());
    }

    #[test]
    fn test_strategy_serde_tags() {
        let s: PourPointStrategy =
            serde_json::from_str(r#"{"mode": "threshold", "threshold": 25}"#).unwrap();
        assert_eq!(
            s,
            PourPointStrategy::Threshold {
                threshold: 25,
                start: None,
                max_radius: None
            }
        );
        let s: PourPointStrategy = serde_json::from_str(r#"{"mode": "explicit", "x": 1, "y": 2}"#).unwrap();
        assert_eq!(s, PourPointStrategy::Explicit { x: 1, y: 2 });
    }
}
